use thiserror::Error;

use crate::shared::constants::TARGET_CLASS_ALIASES;

/// Index of a class in a detector's output vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

#[derive(Error, Debug, PartialEq)]
pub enum TargetClassError {
    #[error("target class must not be empty")]
    Empty,
    #[error("unknown target class '{0}'")]
    Unknown(String),
}

/// Resolve a class label to its index in `vocabulary`, once, at startup.
///
/// Matching is case-insensitive. A label from the phone alias group
/// resolves to whichever of its spellings the vocabulary uses.
pub fn resolve_target_class(
    vocabulary: &[&str],
    requested: &str,
) -> Result<ClassId, TargetClassError> {
    let requested = requested.trim().to_lowercase();
    if requested.is_empty() {
        return Err(TargetClassError::Empty);
    }

    let mut names = vec![requested.clone()];
    if TARGET_CLASS_ALIASES.contains(&requested.as_str()) {
        names.extend(TARGET_CLASS_ALIASES.iter().map(|a| a.to_string()));
    }

    vocabulary
        .iter()
        .position(|label| names.contains(&label.to_lowercase()))
        .map(ClassId)
        .ok_or(TargetClassError::Unknown(requested))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const VOCAB: &[&str] = &["person", "bicycle", "cell phone", "Laptop"];

    #[rstest]
    #[case::exact("cell phone", 2)]
    #[case::alias("cellphone", 2)]
    #[case::short_alias("phone", 2)]
    #[case::case_insensitive("CELL Phone", 2)]
    #[case::padded("  person ", 0)]
    #[case::mixed_case_vocab("laptop", 3)]
    fn test_resolves(#[case] requested: &str, #[case] expected: usize) {
        assert_eq!(resolve_target_class(VOCAB, requested), Ok(ClassId(expected)));
    }

    #[test]
    fn test_alias_resolves_against_other_spelling() {
        let vocab = ["dog", "phone"];
        assert_eq!(resolve_target_class(&vocab, "cell phone"), Ok(ClassId(1)));
    }

    #[test]
    fn test_unknown_class() {
        assert_eq!(
            resolve_target_class(VOCAB, "toaster"),
            Err(TargetClassError::Unknown("toaster".into()))
        );
    }

    #[test]
    fn test_empty_class() {
        assert_eq!(resolve_target_class(VOCAB, "   "), Err(TargetClassError::Empty));
    }
}
