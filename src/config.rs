use std::{collections::HashMap, fmt, fs, path::Path, str::FromStr};

use anyhow::bail;
use serde::{de::Visitor, Deserialize};

use crate::style::{Color, StrokeStyle};

/// Configuration used when no config file is given on the command line.
const BUILTIN: &str = include_str!("../config.example.toml");

#[derive(Deserialize)]
pub struct Config {
    /// Style of the first stroke.
    #[serde(default)]
    pub style: StrokeStyle,
    /// Colors cycled through by `NEXT_COLOR`.
    pub palette: Vec<Color>,
    #[serde(default)]
    pub steps: Steps,
    #[serde(default)]
    pub bind: HashMap<Chord, CommandVerb>,
}

impl Config {
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        log::info!("loaded configuration from `{}`", path.display());
        Ok(config)
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Self::parse(BUILTIN)
    }

    fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;

        // Validate configuration.
        // - The initial style must be reachable with the style controls.
        // - There must be at least one palette color to cycle through.
        // - Steps must move the style somewhere.

        config.style.validate()?;
        if config.palette.is_empty() {
            bail!("`palette` must contain at least one color");
        }
        for (name, step) in [
            ("width", config.steps.width),
            ("blur", config.steps.blur),
            ("spacing", config.steps.spacing),
        ] {
            if !(step.is_finite() && step > 0.0) {
                bail!("steps.{name} must be a positive number (found {step})");
            }
        }

        Ok(config)
    }
}

/// How far one key press moves each style attribute.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Steps {
    pub width: f32,
    pub blur: f32,
    pub spacing: f32,
}

impl Default for Steps {
    fn default() -> Self {
        Self {
            width: 1.0,
            blur: 1.0,
            spacing: 0.1,
        }
    }
}

/// A key together with the modifiers that must be held, written like `ctrl+shift+z`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chord {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    /// The key's character, lowercased.
    pub key: String,
}

impl FromStr for Chord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chord = Chord {
            ctrl: false,
            shift: false,
            alt: false,
            key: String::new(),
        };

        // The key is the last character, so `+` itself can be bound (`+`, `ctrl++`). Everything
        // before it is a `+`-separated list of modifiers.
        let Some(key) = s.chars().next_back() else {
            return Err("key chord is empty".to_string());
        };
        let prefix = &s[..s.len() - key.len_utf8()];
        let modifiers = if prefix.is_empty() {
            None
        } else {
            match prefix.strip_suffix('+') {
                Some(modifiers) => Some(modifiers),
                None => return Err(format!("key chord '{s}' must end in a single character")),
            }
        };
        chord.key = key.to_lowercase().collect();

        for modifier in modifiers.into_iter().flat_map(|m| m.split('+')) {
            let flag = match &*modifier.to_lowercase() {
                "ctrl" | "control" => &mut chord.ctrl,
                "shift" => &mut chord.shift,
                "alt" => &mut chord.alt,
                _ => return Err(format!("unknown modifier '{modifier}' in key chord '{s}'")),
            };
            *flag = true;
        }

        Ok(chord)
    }
}

impl<'a> Deserialize<'a> for Chord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        struct FromStrVisitor;

        impl<'de> Visitor<'de> for FromStrVisitor {
            type Value = Chord;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("key chord like `ctrl+z`")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(FromStrVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CommandVerb {
    #[serde(rename = "UNDO")]
    Undo,
    #[serde(rename = "REDO")]
    Redo,
    #[serde(rename = "WIDTH_UP")]
    WidthUp,
    #[serde(rename = "WIDTH_DOWN")]
    WidthDown,
    #[serde(rename = "BLUR_UP")]
    BlurUp,
    #[serde(rename = "BLUR_DOWN")]
    BlurDown,
    #[serde(rename = "SPACING_UP")]
    SpacingUp,
    #[serde(rename = "SPACING_DOWN")]
    SpacingDown,
    #[serde(rename = "NEXT_COLOR")]
    NextColor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_example_config() {
        Config::load("config.example.toml").unwrap();
    }

    #[test]
    fn builtin_config_binds_undo_redo() {
        let config = Config::builtin().unwrap();
        let undo = "ctrl+z".parse::<Chord>().unwrap();
        let redo = "ctrl+shift+z".parse::<Chord>().unwrap();
        assert_eq!(config.bind.get(&undo), Some(&CommandVerb::Undo));
        assert_eq!(config.bind.get(&redo), Some(&CommandVerb::Redo));
    }

    #[test]
    fn parses_chords() {
        let chord: Chord = "Ctrl+Shift+Z".parse().unwrap();
        assert_eq!(
            chord,
            Chord {
                ctrl: true,
                shift: true,
                alt: false,
                key: "z".into(),
            }
        );
        assert_eq!("]".parse::<Chord>().unwrap().key, "]");

        assert!("".parse::<Chord>().is_err());
        assert!("ctrl+".parse::<Chord>().is_err());
        assert!("+z".parse::<Chord>().is_err());
        assert!("super+z".parse::<Chord>().is_err());
        assert!("ctrl+zz".parse::<Chord>().is_err());
    }

    #[test]
    fn binds_plus_key() {
        let plus: Chord = "+".parse().unwrap();
        assert_eq!(plus.key, "+");
        assert!(!plus.ctrl && !plus.shift && !plus.alt);

        assert_eq!(
            "ctrl++".parse::<Chord>().unwrap(),
            Chord {
                ctrl: true,
                shift: false,
                alt: false,
                key: "+".into(),
            }
        );
        assert!("ctrl+shift++".parse::<Chord>().unwrap().shift);
        assert!("ctrl+++".parse::<Chord>().is_err());
    }

    #[test]
    fn defaults_missing_sections() {
        let config = Config::parse(r#"palette = ["black"]"#).unwrap();
        assert_eq!(config.style, StrokeStyle::default());
        assert_eq!(config.steps.spacing, 0.1);
        assert!(config.bind.is_empty());
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(Config::parse("palette = []").is_err());
        assert!(Config::parse(r#"palette = ["not-a-color"]"#).is_err());
        assert!(Config::parse(
            r#"
            palette = ["black"]
            [style]
            width = 0.5
            "#
        )
        .is_err());
        assert!(Config::parse(
            r#"
            palette = ["black"]
            [steps]
            blur = 0.0
            "#
        )
        .is_err());
        assert!(Config::parse(
            r#"
            palette = ["black"]
            [bind]
            "ctrl+z" = "EXPLODE"
            "#
        )
        .is_err());
    }
}
