//! Project identifier normalisation.
//!
//! SDKs identify the project either by its canonical numeric id (`"42"`) or
//! by the verbose id shown in the dashboard, a hashids encoding of the
//! numeric id. Both resolve to the same `u32`.

use harsh::Harsh;

use crate::config::VerboseIdConfig;
use crate::IntakeError;

/// Reasons a project identifier fails to normalise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectIdError {
    #[error("invalid project id {0:?}")]
    Invalid(String),
}

/// Encoder/decoder for verbose project ids.
pub struct VerboseIdCodec {
    harsh: Harsh,
    alphabet: String,
    /// Length of the longest id any `u32` encodes to.
    max_len: usize,
}

impl std::fmt::Debug for VerboseIdCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerboseIdCodec").finish_non_exhaustive()
    }
}

impl VerboseIdCodec {
    pub fn new(config: &VerboseIdConfig) -> Result<Self, IntakeError> {
        let harsh = Harsh::builder()
            .salt(config.salt.as_str())
            .length(config.min_length)
            .alphabet(config.alphabet.as_str())
            .build()
            .map_err(|e| IntakeError::Config(format!("invalid verbose id settings: {e}")))?;
        let max_len = harsh.encode(&[u64::from(u32::MAX)]).len();

        // Every id decode accepts must unhash into a u64.
        let digits = u32::try_from(max_len.saturating_sub(1)).unwrap_or(u32::MAX);
        let base = u64::try_from(config.alphabet.chars().count()).unwrap_or(u64::MAX);
        if base.checked_pow(digits).is_none() {
            return Err(IntakeError::Config(format!(
                "verbose id min_length {} is too long for a {base}-character alphabet",
                config.min_length
            )));
        }

        Ok(Self {
            harsh,
            alphabet: config.alphabet.clone(),
            max_len,
        })
    }

    pub fn encode(&self, project_id: u32) -> String {
        self.harsh.encode(&[u64::from(project_id)])
    }

    /// Decode a verbose id. Exactly one value that fits in a `u32` is accepted.
    ///
    /// Input longer than any valid id, or with characters outside the
    /// alphabet, is rejected before it reaches the hashids decoder, which
    /// overflows on such input.
    pub fn decode(&self, verbose_id: &str) -> Result<u32, ProjectIdError> {
        let invalid = || ProjectIdError::Invalid(verbose_id.to_owned());
        if verbose_id.is_empty()
            || verbose_id.len() > self.max_len
            || !verbose_id.chars().all(|c| self.alphabet.contains(c))
        {
            return Err(invalid());
        }
        match self.harsh.decode(verbose_id).map_err(|_| invalid())?.as_slice() {
            [value] => u32::try_from(*value).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// Map a raw project identifier to its canonical numeric id.
///
/// Plain decimals win; anything else is tried as a verbose id. Decimals are
/// read as signed 32-bit values and must not be negative.
pub fn normalize(raw: &str, codec: &VerboseIdCodec) -> Result<u32, ProjectIdError> {
    if let Ok(id) = raw.parse::<i32>() {
        return u32::try_from(id).map_err(|_| ProjectIdError::Invalid(raw.to_owned()));
    }
    codec.decode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_codec() -> VerboseIdCodec {
        VerboseIdCodec::new(&VerboseIdConfig::default()).unwrap()
    }

    #[test]
    fn decimal_ids_parse_directly() {
        let codec = default_codec();
        assert_eq!(normalize("1", &codec), Ok(1));
        assert_eq!(normalize("2147483647", &codec), Ok(2_147_483_647));
    }

    #[test]
    fn verbose_id_round_trips() {
        let codec = default_codec();
        for id in [0, 1, 42, 1_000_000, u32::MAX] {
            let verbose = codec.encode(id);
            assert!(verbose.len() >= crate::config::DEFAULT_VERBOSE_ID_MIN_LENGTH);
            assert_eq!(normalize(&verbose, &codec), Ok(id), "verbose id {verbose}");
        }
    }

    #[test]
    fn salt_changes_encoding() {
        let salted = VerboseIdCodec::new(&VerboseIdConfig {
            salt: "pepper".to_string(),
            ..Default::default()
        })
        .unwrap();
        let plain = default_codec();

        assert_ne!(salted.encode(7), plain.encode(7));
        assert_eq!(salted.decode(&salted.encode(7)), Ok(7));
    }

    #[test]
    fn garbage_is_rejected_without_panicking() {
        let codec = default_codec();
        for raw in ["", "not a project", "!!!!!!!!", "ABCDEFGH", "-5"] {
            assert_eq!(
                normalize(raw, &codec),
                Err(ProjectIdError::Invalid(raw.to_string())),
                "input {raw:?}"
            );
        }
    }

    #[test]
    fn long_or_foreign_input_is_rejected_without_overflow() {
        let codec = default_codec();
        let longest = codec.encode(u32::MAX);
        for raw in [
            "x-bea759m6 p0koxvr2gsmu",
            "abcdefghijklmnopqrstuvwxyz1234567890abcdefghijklmnopqrstuvwxyz",
            "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz",
            "ÄÖÜßäöü",
        ] {
            assert_eq!(
                normalize(raw, &codec),
                Err(ProjectIdError::Invalid(raw.to_string())),
                "input {raw:?}"
            );
        }
        let too_long = format!("{longest}a");
        assert!(normalize(&too_long, &codec).is_err());
    }

    #[test]
    fn multi_value_verbose_ids_are_rejected() {
        let codec = default_codec();
        let harsh = Harsh::builder()
            .length(crate::config::DEFAULT_VERBOSE_ID_MIN_LENGTH)
            .alphabet(crate::config::DEFAULT_VERBOSE_ID_ALPHABET)
            .build()
            .unwrap();
        let pair = harsh.encode(&[1, 2]);

        assert!(codec.decode(&pair).is_err());
    }

    #[test]
    fn oversized_min_length_is_a_config_error() {
        let result = VerboseIdCodec::new(&VerboseIdConfig {
            min_length: 64,
            ..Default::default()
        });
        assert!(matches!(result, Err(IntakeError::Config(_))));
    }

    #[test]
    fn invalid_alphabet_is_a_config_error() {
        let result = VerboseIdCodec::new(&VerboseIdConfig {
            alphabet: "abc".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(IntakeError::Config(_))));
    }
}
