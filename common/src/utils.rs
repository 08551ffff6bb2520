use ethers::abi::{self, ParamType, Token};
use ethers::types::Address;

/// Whether the address is the zero address (an unset controller)
pub fn is_unset(address: &Address) -> bool {
    address.is_zero()
}

/// Read an address from a single 32-byte ABI word
pub fn address_from_word(word: &[u8]) -> Option<Address> {
    if word.len() != 32 {
        return None;
    }
    match abi::decode(&[ParamType::Address], word).ok()?.pop()? {
        Token::Address(address) => Some(address),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_word_conversion() {
        let address = Address::from_low_u64_be(0xdead);
        let word = abi::encode(&[Token::Address(address)]);
        assert_eq!(address_from_word(&word), Some(address));
    }

    #[test]
    fn test_partial_or_oversized_word_is_rejected() {
        let word = abi::encode(&[Token::Address(Address::from_low_u64_be(1))]);
        assert_eq!(address_from_word(&word[..20]), None);
        assert_eq!(address_from_word(&[]), None);

        let mut two_words = word.clone();
        two_words.extend_from_slice(&word);
        assert_eq!(address_from_word(&two_words), None);
    }

    #[test]
    fn test_zero_is_unset() {
        assert!(is_unset(&Address::zero()));
        assert!(!is_unset(&Address::from_low_u64_be(1)));
    }
}
