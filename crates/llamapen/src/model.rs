//! Supported model identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::LlamaError;

/// The fixed set of model sizes this crate knows how to fetch and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    SevenB,
    ThirteenB,
    ThirtyB,
    SixtyFiveB,
}

impl Model {
    /// All supported models, smallest first.
    pub const ALL: [Model; 4] = [
        Model::SevenB,
        Model::ThirteenB,
        Model::ThirtyB,
        Model::SixtyFiveB,
    ];

    /// Canonical identifier, as accepted by [`Model::from_str`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::SevenB => "7B",
            Model::ThirteenB => "13B",
            Model::ThirtyB => "30B",
            Model::SixtyFiveB => "65B",
        }
    }

    /// Filename of the weights on disk.
    pub fn filename(&self) -> String {
        format!("{}.bin", self.as_str())
    }

    /// Expected SHA-256 of the weights, when the registry publishes one.
    pub fn sha256(&self) -> Option<&'static str> {
        // Checksums to be added once the registry pins model revisions.
        None
    }
}

impl FromStr for Model {
    type Err = LlamaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7B" => Ok(Model::SevenB),
            "13B" => Ok(Model::ThirteenB),
            "30B" => Ok(Model::ThirtyB),
            "65B" => Ok(Model::SixtyFiveB),
            other => Err(LlamaError::InvalidModel(other.to_string())),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_identifiers_round_trip() {
        for model in Model::ALL {
            assert_eq!(model.as_str().parse::<Model>().unwrap(), model);
        }
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        for bad in ["", "7b", "175B", "alpaca"] {
            match bad.parse::<Model>() {
                Err(LlamaError::InvalidModel(name)) => assert_eq!(name, bad),
                other => panic!("expected InvalidModel, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_filename() {
        assert_eq!(Model::SevenB.filename(), "7B.bin");
        assert_eq!(Model::SixtyFiveB.filename(), "65B.bin");
    }
}
