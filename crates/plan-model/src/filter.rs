//! Declarative filter descriptions.
//!
//! A [`FilterSpec`] is only a name plus parameters. Translation into encoder
//! filter syntax happens at render time, so plans stay portable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::PlanError;

/// An 8-bit RGBA color, written as `#RRGGBB` or `#RRGGBBAA` in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Alpha as a fraction in `[0, 1]`.
    pub fn alpha_f64(&self) -> f64 {
        self.a as f64 / 255.0
    }

    /// `0xRRGGBB` form without alpha.
    pub fn hex_rgb(&self) -> String {
        format!("0x{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgba {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || PlanError::InvalidColor(s.to_string());
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Rgba::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "#{:02X}{:02X}{:02X}{:02X}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rgba {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single filter parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterParam {
    Number(f64),
    Color(Rgba),
}

/// A named visual filter with parameters, e.g. `brightness { amount: 0.1 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, FilterParam>,
}

impl FilterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), FilterParam::Number(value));
        self
    }

    pub fn with_color(mut self, key: impl Into<String>, value: Rgba) -> Self {
        self.params.insert(key.into(), FilterParam::Color(value));
        self
    }

    /// Numeric parameter, if present and numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.params.get(key) {
            Some(FilterParam::Number(v)) => Some(*v),
            _ => None,
        }
    }

    /// Color parameter, if present and a color.
    pub fn color(&self, key: &str) -> Option<Rgba> {
        match self.params.get(key) {
            Some(FilterParam::Color(c)) => Some(*c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colors() {
        assert_eq!("#FF8000".parse::<Rgba>().unwrap(), Rgba::rgb(255, 128, 0));
        assert_eq!(
            "ff800080".parse::<Rgba>().unwrap(),
            Rgba::rgba(255, 128, 0, 128)
        );
        assert!("#FFF".parse::<Rgba>().is_err());
        assert!("#GGGGGG".parse::<Rgba>().is_err());
    }

    #[test]
    fn test_color_display_roundtrip_through_json() {
        let c = Rgba::rgba(16, 32, 48, 200);
        assert_eq!(c.to_string(), "#102030C8");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"#102030C8\"");
        assert_eq!(Rgba::rgb(1, 2, 3).hex_rgb(), "0x010203");
    }

    #[test]
    fn test_filter_params_from_json() {
        let spec: FilterSpec = serde_json::from_str(
            r##"{ "name": "tint", "params": { "color": "#FFAA00", "opacity": 0.25 } }"##,
        )
        .unwrap();
        assert_eq!(spec.name, "tint");
        assert_eq!(spec.color("color"), Some(Rgba::rgb(255, 170, 0)));
        assert_eq!(spec.number("opacity"), Some(0.25));
        assert_eq!(spec.number("color"), None);
    }

    #[test]
    fn test_filter_without_params() {
        let spec: FilterSpec = serde_json::from_str(r#"{ "name": "grayscale" }"#).unwrap();
        assert!(spec.params.is_empty());
        assert_eq!(
            serde_json::to_string(&spec).unwrap(),
            r#"{"name":"grayscale"}"#
        );
    }
}
