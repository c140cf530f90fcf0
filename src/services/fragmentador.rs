//! Fragmentação de respostas longas em mensagens menores.
//!
//! A quebra tenta os separadores mais naturais primeiro (parágrafo, linha,
//! fim de frase) e só cai para espaço quando o pedaço ainda não cabe. O
//! separador fica grudado no pedaço anterior, então a concatenação simples
//! dos fragmentos reconstrói o texto original.

/// Separadores em ordem de preferência
const SEPARADORES: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// Fragmenta o texto em pedaços de até `max` caracteres.
///
/// Uma palavra isolada maior que `max` é emitida sozinha, acima do limite:
/// quebrar no meio de uma URL ou de um código de rastreio seria pior.
pub fn fragmentar(texto: &str, max: usize) -> Vec<String> {
    if texto.chars().count() <= max {
        return vec![texto.to_string()];
    }

    let mut atomos = Vec::new();
    fragmentar_em(texto, max, 0, &mut atomos);

    // Empacota átomos vizinhos de volta até o limite
    let mut fragmentos: Vec<String> = Vec::new();
    let mut atual = String::new();
    let mut atual_chars = 0usize;
    for atomo in atomos {
        let atomo_chars = atomo.chars().count();
        if atual_chars + atomo_chars > max && !atual.is_empty() {
            fragmentos.push(std::mem::take(&mut atual));
            atual_chars = 0;
        }
        atual.push_str(&atomo);
        atual_chars += atomo_chars;
    }
    if !atual.is_empty() {
        fragmentos.push(atual);
    }
    fragmentos
}

fn fragmentar_em(texto: &str, max: usize, nivel: usize, saida: &mut Vec<String>) {
    if texto.chars().count() <= max || nivel >= SEPARADORES.len() {
        if !texto.is_empty() {
            saida.push(texto.to_string());
        }
        return;
    }

    let pedacos = dividir_mantendo_sep(texto, SEPARADORES[nivel]);
    if pedacos.len() == 1 {
        // Separador ausente neste nível, tenta o próximo
        fragmentar_em(texto, max, nivel + 1, saida);
        return;
    }
    for pedaco in pedacos {
        fragmentar_em(&pedaco, max, nivel + 1, saida);
    }
}

/// Divide por `sep` mantendo o separador no fim do pedaço anterior, de modo
/// que `pedacos.concat() == texto`.
fn dividir_mantendo_sep(texto: &str, sep: &str) -> Vec<String> {
    let mut pedacos = Vec::new();
    let mut inicio = 0;
    while let Some(pos) = texto[inicio..].find(sep) {
        let fim = inicio + pos + sep.len();
        pedacos.push(texto[inicio..fim].to_string());
        inicio = fim;
    }
    if inicio < texto.len() {
        pedacos.push(texto[inicio..].to_string());
    }
    if pedacos.is_empty() {
        pedacos.push(texto.to_string());
    }
    pedacos
}
