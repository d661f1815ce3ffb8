//! Credential and account-number generation for provisioning.

use rand::seq::SliceRandom;
use rand::Rng;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Short random temporary credential for a freshly created customer login.
/// Guaranteed to contain at least one uppercase letter, one lowercase letter
/// and one digit; the customer is prompted to change it on first login.
pub fn generate_temp_credential(rng: &mut impl Rng, len: usize) -> String {
    debug_assert!(len >= 3, "credential length must fit one char per class");

    let mut chars: Vec<u8> = Vec::with_capacity(len);
    chars.push(*UPPER.choose(rng).expect("non-empty charset"));
    chars.push(*LOWER.choose(rng).expect("non-empty charset"));
    chars.push(*DIGITS.choose(rng).expect("non-empty charset"));

    let all: Vec<u8> = [UPPER, LOWER, DIGITS].concat();
    while chars.len() < len {
        chars.push(*all.choose(rng).expect("non-empty charset"));
    }
    chars.shuffle(rng);

    String::from_utf8(chars).expect("ascii charset")
}

/// Subscriber account number: `ACC-<year>-<6 chars A-Z0-9>`.
pub fn generate_account_number(rng: &mut impl Rng, year: i32) -> String {
    const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let suffix: String = (0..6)
        .map(|_| *SUFFIX_CHARSET.choose(rng).expect("non-empty charset") as char)
        .collect();
    format!("ACC-{year}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_has_length_and_class_mix() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let cred = generate_temp_credential(&mut rng, 12);
            assert_eq!(cred.len(), 12);
            assert!(cred.bytes().any(|b| b.is_ascii_uppercase()));
            assert!(cred.bytes().any(|b| b.is_ascii_lowercase()));
            assert!(cred.bytes().any(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn account_number_shape() {
        let mut rng = rand::thread_rng();
        let acc = generate_account_number(&mut rng, 2025);
        assert!(acc.starts_with("ACC-2025-"));
        assert_eq!(acc.len(), "ACC-2025-".len() + 6);
        assert!(acc["ACC-2025-".len()..]
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }
}
