//! Retry com backoff exponencial para chamadas idempotentes de colaboradores
//! (upload de blob, transcrição, descrição de imagem). Envio de mensagem ao
//! provedor NUNCA passa por aqui: retry de envio duplica mensagem na tela do
//! cliente.

use std::future::Future;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_tentativas: u32,
    pub backoff_inicial_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tentativas: 3,
            backoff_inicial_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Executa a operação até ela ter sucesso ou as tentativas esgotarem.
    /// O backoff dobra a cada falha.
    pub async fn executar<T, E, F, Fut>(&self, mut operacao: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut backoff_ms = self.backoff_inicial_ms;
        let mut tentativa = 1;
        loop {
            match operacao().await {
                Ok(valor) => return Ok(valor),
                Err(erro) if tentativa < self.max_tentativas => {
                    tracing::warn!(
                        "Tentativa {}/{} falhou: {}. Aguardando {}ms...",
                        tentativa,
                        self.max_tentativas,
                        erro,
                        backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                    tentativa += 1;
                }
                Err(erro) => return Err(erro),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn sucesso_na_segunda_tentativa() {
        let chamadas = Arc::new(AtomicU32::new(0));
        let contador = chamadas.clone();

        let resultado: Result<u32, String> = RetryPolicy::default()
            .executar(|| {
                let contador = contador.clone();
                async move {
                    let n = contador.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 2 {
                        Err("ainda não".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(resultado.unwrap(), 2);
        assert_eq!(chamadas.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn esgota_as_tentativas_e_devolve_o_ultimo_erro() {
        let chamadas = Arc::new(AtomicU32::new(0));
        let contador = chamadas.clone();

        let resultado: Result<(), String> = RetryPolicy {
            max_tentativas: 3,
            backoff_inicial_ms: 1,
        }
        .executar(|| {
            let contador = contador.clone();
            async move {
                contador.fetch_add(1, Ordering::SeqCst);
                Err("fora do ar".to_string())
            }
        })
        .await;

        assert_eq!(resultado.unwrap_err(), "fora do ar");
        assert_eq!(chamadas.load(Ordering::SeqCst), 3);
    }
}
