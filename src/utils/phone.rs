//! Normalização de telefones e JIDs de WhatsApp

/// Reduz um telefone a dígitos, descartando máscara e prefixo internacional
pub fn normalizar_telefone(telefone: &str) -> String {
    telefone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// JIDs de grupo terminam em `@g.us`
pub fn eh_jid_grupo(jid: &str) -> bool {
    jid.ends_with("@g.us")
}

/// Extrai o telefone de um JID da Evolution.
///
/// `5511999999999@s.whatsapp.net` vira `5511999999999`; o sufixo de device
/// (`:12`) é descartado quando presente.
pub fn extrair_telefone_de_jid(jid: &str) -> String {
    let antes_arroba = jid.split('@').next().unwrap_or(jid);
    let sem_device = antes_arroba.split(':').next().unwrap_or(antes_arroba);
    normalizar_telefone(sem_device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telefone_com_mascara_vira_digitos() {
        assert_eq!(normalizar_telefone("+55 (11) 99999-9999"), "5511999999999");
    }

    #[test]
    fn jid_de_grupo_e_reconhecido() {
        assert!(eh_jid_grupo("120363041234567890@g.us"));
        assert!(!eh_jid_grupo("5511999999999@s.whatsapp.net"));
    }

    #[test]
    fn jid_com_device_perde_o_sufixo() {
        assert_eq!(
            extrair_telefone_de_jid("5511999999999:12@s.whatsapp.net"),
            "5511999999999"
        );
        assert_eq!(
            extrair_telefone_de_jid("5511999999999@s.whatsapp.net"),
            "5511999999999"
        );
    }
}
