use rand::Rng;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// 生成指定长度的大写字母数字码（去掉易混淆的 0/O/1/I）
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code() {
        let code = generate_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert!(!code.contains('0') && !code.contains('O'));
    }

    #[test]
    fn test_generate_multiple_codes_have_requested_length() {
        // 理论上可能相同，这里只检查长度
        assert_eq!(generate_code(6).len(), 6);
        assert_eq!(generate_code(12).len(), 12);
    }
}
