//! Target size parsing and validation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Dimension values the proxy is willing to produce.
pub const ALLOWED_DIMENSIONS: [u64; 6] = [100, 200, 400, 600, 800, 1200];

/// Requested output size. A zero dimension means "derive from aspect ratio".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u64,
    pub height: u64,
}

impl Size {
    pub fn new(width: u64, height: u64) -> Self {
        Self { width, height }
    }

    /// Whether this size is in the allowed set.
    ///
    /// With one dimension at zero only the other one is checked; `0x0` is never
    /// allowed.
    pub fn is_allowed(&self) -> bool {
        if self.height == 0 {
            return is_allowed_dimension(self.width);
        }
        if self.width == 0 {
            return is_allowed_dimension(self.height);
        }
        is_allowed_dimension(self.width) && is_allowed_dimension(self.height)
    }

    /// Transformer action implied by the size shape.
    pub fn action(&self) -> TransformAction {
        if self.width == 0 || self.height == 0 {
            TransformAction::Resize
        } else {
            TransformAction::SmartCrop
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub fn is_allowed_dimension(value: u64) -> bool {
    ALLOWED_DIMENSIONS.contains(&value)
}

/// Reject sizes outside the allowed set.
pub fn check_size(size: Size) -> Result<(), ValidationError> {
    if size.is_allowed() {
        Ok(())
    } else {
        Err(ValidationError::SizeNotAllowed {
            size: size.to_string(),
        })
    }
}

/// Parse one dimension. Only ASCII digits are accepted, so signs and
/// whitespace are rejected even where `u64::from_str` would take them.
fn parse_dimension(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parse a user supplied size: `W` or `WxH` (the `x` is case-insensitive).
///
/// Parsing does not check the allowed set; see [`Size::is_allowed`].
pub fn parse_size(input: &str) -> Result<Size, ValidationError> {
    let invalid = || ValidationError::InvalidSize {
        input: input.to_string(),
    };
    let lowered = input.to_ascii_lowercase();

    match lowered.split_once('x') {
        Some((width, height)) => {
            let width = parse_dimension(width).ok_or_else(invalid)?;
            let height = parse_dimension(height).ok_or_else(invalid)?;
            Ok(Size::new(width, height))
        }
        None => {
            let width = parse_dimension(&lowered).ok_or_else(invalid)?;
            Ok(Size::new(width, 0))
        }
    }
}

/// Action requested from the upstream transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformAction {
    /// Resize preserving aspect ratio; one dimension is free.
    Resize,
    /// Crop to the exact requested dimensions.
    SmartCrop,
}

impl TransformAction {
    /// Path segment understood by the transformer.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformAction::Resize => "resize",
            TransformAction::SmartCrop => "smartcrop",
        }
    }
}

impl fmt::Display for TransformAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_cases() {
        let cases: &[(&str, Option<Size>)] = &[
            ("200", Some(Size::new(200, 0))),
            ("2xx00", None),
            ("2x300", Some(Size::new(2, 300))),
            ("400X600", Some(Size::new(400, 600))),
            ("x200", None),
            ("200x", None),
            ("", None),
            ("-1", None),
            ("+200", None),
            ("200x+400", None),
            (" 200", None),
            ("99999999999999999999", None),
        ];

        for (input, expected) in cases {
            let actual = parse_size(input).ok();
            assert_eq!(&actual, expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_size_is_allowed() {
        assert!(Size::new(200, 0).is_allowed());
        assert!(Size::new(0, 1200).is_allowed());
        assert!(Size::new(400, 600).is_allowed());
        assert!(!Size::new(0, 0).is_allowed());
        assert!(!Size::new(2, 300).is_allowed());
        assert!(!Size::new(200, 300).is_allowed());
    }

    #[test]
    fn test_check_size() {
        assert!(check_size(Size::new(800, 0)).is_ok());
        assert_eq!(
            check_size(Size::new(201, 0)),
            Err(ValidationError::SizeNotAllowed {
                size: "201x0".to_string()
            })
        );
    }

    #[test]
    fn test_size_action() {
        assert_eq!(Size::new(200, 0).action(), TransformAction::Resize);
        assert_eq!(Size::new(0, 200).action(), TransformAction::Resize);
        assert_eq!(Size::new(200, 200).action(), TransformAction::SmartCrop);
        assert_eq!(TransformAction::SmartCrop.as_str(), "smartcrop");
    }

    #[test]
    fn test_size_display() {
        assert_eq!(Size::new(800, 600).to_string(), "800x600");
    }
}
