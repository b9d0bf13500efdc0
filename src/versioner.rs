//! @ai:module:intent Deterministic content hashing for prompts
//! @ai:module:layer domain
//! @ai:module:public_api PromptHash, hash_prompt
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// @ai:intent Lower-case hex SHA-256 digest of normalized prompt content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptHash(String);

impl PromptHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PromptHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// @ai:intent Hash prompt content; surrounding whitespace is trimmed, nothing else is normalized
/// @ai:effects pure
pub fn hash_prompt(content: &str) -> PromptHash {
    let digest = Sha256::digest(content.trim().as_bytes());
    PromptHash(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_prompt("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_equal_content_hashes_identically() {
        assert_eq!(hash_prompt("What is 2+2?"), hash_prompt("What is 2+2?"));
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        assert_eq!(hash_prompt("  What is 2+2?\n"), hash_prompt("What is 2+2?"));
    }

    #[test]
    fn test_case_and_inner_whitespace_are_preserved() {
        assert_ne!(hash_prompt("prompt1"), hash_prompt("prompt2"));
        assert_ne!(hash_prompt("Hello"), hash_prompt("hello"));
        assert_ne!(hash_prompt("a  b"), hash_prompt("a b"));
    }
}
