//! Hashing, name validation and small numeric helpers shared by the model,
//! merging and code generation stages.

use std::collections::BTreeMap;
use sha2::{Sha256, Digest};
use regex::Regex;
use lazy_static::lazy_static;
use crate::error::ConfigurationError;


/// SHA-256 digest used to compare groups for merging
pub type HashDigest = [u8; 32];

/// Feeds a value into a running SHA-256 hash, strings and collections are
/// prefixed with their length so adjacent values cannot alias
pub trait UpdateHash {
    fn update_hash(&self, hasher: &mut Sha256);
}

macro_rules! impl_update_hash_for_numeric {
    ($($t:ty),*) => {
        $(
            impl UpdateHash for $t {
                fn update_hash(&self, hasher: &mut Sha256) {
                    hasher.update(self.to_le_bytes());
                }
            }
        )*
    };
}

impl_update_hash_for_numeric!(u8, u32, u64, i32, i64);

impl UpdateHash for usize {
    fn update_hash(&self, hasher: &mut Sha256) {
        (*self as u64).update_hash(hasher);
    }
}

impl UpdateHash for f64 {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.to_bits().update_hash(hasher);
    }
}

impl UpdateHash for bool {
    fn update_hash(&self, hasher: &mut Sha256) {
        hasher.update([*self as u8]);
    }
}

impl UpdateHash for str {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.len().update_hash(hasher);
        hasher.update(self.as_bytes());
    }
}

impl UpdateHash for String {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.as_str().update_hash(hasher);
    }
}

impl<T: UpdateHash + ?Sized> UpdateHash for &T {
    fn update_hash(&self, hasher: &mut Sha256) {
        (**self).update_hash(hasher);
    }
}

impl<T: UpdateHash> UpdateHash for [T] {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.len().update_hash(hasher);
        for item in self {
            item.update_hash(hasher);
        }
    }
}

impl<const N: usize> UpdateHash for [u8; N] {
    fn update_hash(&self, hasher: &mut Sha256) {
        hasher.update(self);
    }
}

impl<T: UpdateHash> UpdateHash for Vec<T> {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.as_slice().update_hash(hasher);
    }
}

impl<T: UpdateHash> UpdateHash for Option<T> {
    fn update_hash(&self, hasher: &mut Sha256) {
        match self {
            Some(value) => {
                true.update_hash(hasher);
                value.update_hash(hasher);
            },
            None => false.update_hash(hasher),
        }
    }
}

impl<K: UpdateHash, V: UpdateHash> UpdateHash for BTreeMap<K, V> {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.len().update_hash(hasher);
        for (key, value) in self {
            key.update_hash(hasher);
            value.update_hash(hasher);
        }
    }
}

/// Hashes a single value into a fresh digest
pub fn digest_of<T: UpdateHash + ?Sized>(value: &T) -> HashDigest {
    let mut hasher = Sha256::new();
    value.update_hash(&mut hasher);
    finish_hash(hasher)
}

pub fn finish_hash(hasher: Sha256) -> HashDigest {
    hasher.finalize().into()
}

/// Lower case hex representation of a digest
pub fn digest_to_hex(digest: &HashDigest) -> String {
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

lazy_static! {
    static ref VARIABLE_NAME_REGEX: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
    static ref POPULATION_NAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_]+$").unwrap();
}

/// Checks a variable or parameter name is a valid C identifier
pub fn validate_var_name(name: &str, description: &str) -> Result<(), ConfigurationError> {
    if VARIABLE_NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidName { description: description.to_string(), name: name.to_string() })
    }
}

/// Checks a population name, which is prefixed when used so may start with a digit
pub fn validate_pop_name(name: &str, description: &str) -> Result<(), ConfigurationError> {
    if POPULATION_NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidName { description: description.to_string(), name: name.to_string() })
    }
}

pub fn ceil_divide(numerator: usize, denominator: usize) -> usize {
    (numerator + denominator - 1) / denominator
}

/// Rounds `size` up to the next multiple of `block_size`
pub fn pad_size(size: usize, block_size: usize) -> usize {
    ceil_divide(size, block_size) * block_size
}

/// Uppercases the first character, used when building symbol names
pub fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_size() {
        assert_eq!(pad_size(0, 32), 0);
        assert_eq!(pad_size(1, 32), 32);
        assert_eq!(pad_size(32, 32), 32);
        assert_eq!(pad_size(33, 64), 64);
        assert_eq!(ceil_divide(100, 32), 4);
    }

    #[test]
    fn test_names() {
        assert!(validate_var_name("V_m", "Variable").is_ok());
        assert!(validate_var_name("1V", "Variable").is_err());
        assert!(validate_var_name("V m", "Variable").is_err());
        assert!(validate_pop_name("1Pop", "Neuron group").is_ok());
        assert!(validate_pop_name("Pop-1", "Neuron group").is_err());
    }

    #[test]
    fn test_hash_prefixes_lengths() {
        let a = digest_of(&vec!["ab".to_string(), "c".to_string()]);
        let b = digest_of(&vec!["a".to_string(), "bc".to_string()]);

        assert_ne!(a, b);
        assert_eq!(a, digest_of(&vec!["ab".to_string(), "c".to_string()]));
        assert_eq!(upper_first("neuron"), "Neuron");
    }
}
