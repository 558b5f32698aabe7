#![forbid(unsafe_code)]

//! Easing curves and value interpolation for transitions.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::DomError;
use crate::value::Value;

/// Easing curve mapping normalized time to normalized progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ease {
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicIn,
    CubicOut,
    #[default]
    CubicInOut,
    SinInOut,
}

impl Ease {
    /// Apply the curve to `t`, clamped to `[0, 1]`.
    #[must_use]
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::QuadIn => t * t,
            Self::QuadOut => t * (2.0 - t),
            Self::QuadInOut => {
                let t = t * 2.0;
                if t <= 1.0 {
                    t * t / 2.0
                } else {
                    let t = t - 1.0;
                    (t * (2.0 - t) + 1.0) / 2.0
                }
            }
            Self::CubicIn => t * t * t,
            Self::CubicOut => {
                let t = t - 1.0;
                t * t * t + 1.0
            }
            Self::CubicInOut => {
                let t = t * 2.0;
                if t <= 1.0 {
                    t * t * t / 2.0
                } else {
                    let t = t - 2.0;
                    (t * t * t + 2.0) / 2.0
                }
            }
            Self::SinInOut => (1.0 - (PI * t).cos()) / 2.0,
        }
    }
}

impl FromStr for Ease {
    type Err = DomError;

    /// Accepts `linear`, `quad`, `quadIn`, `cubicOut`, ... with or without
    /// an `ease` prefix. A bare family name means its in-out variant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("ease").unwrap_or(s).to_ascii_lowercase();
        Ok(match name.as_str() {
            "linear" => Self::Linear,
            "quadin" => Self::QuadIn,
            "quadout" => Self::QuadOut,
            "quad" | "quadinout" => Self::QuadInOut,
            "cubicin" => Self::CubicIn,
            "cubicout" => Self::CubicOut,
            "cubic" | "cubicinout" => Self::CubicInOut,
            "sin" | "sininout" => Self::SinInOut,
            _ => {
                return Err(DomError::InvalidArgument {
                    method: "ease".into(),
                    reason: format!("unknown easing '{s}'"),
                });
            }
        })
    }
}

impl fmt::Display for Ease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linear => "linear",
            Self::QuadIn => "quadIn",
            Self::QuadOut => "quadOut",
            Self::QuadInOut => "quadInOut",
            Self::CubicIn => "cubicIn",
            Self::CubicOut => "cubicOut",
            Self::CubicInOut => "cubicInOut",
            Self::SinInOut => "sinInOut",
        };
        f.write_str(name)
    }
}

fn split_number(s: &str) -> Option<(f64, &str)> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map_or(s.len(), |(i, _)| i);
    let number = s[..end].parse().ok()?;
    Some((number, &s[end..]))
}

fn format_number(n: f64) -> String {
    let rounded = (n * 1e6).round() / 1e6;
    Value::Number(rounded).render()
}

/// Interpolate from the current host value towards `to` at eased progress
/// `t`. Numbers sharing a unit (`10px` → `20px`) are interpolated; anything
/// else holds the start value until the end, then snaps to `to`.
#[must_use]
pub fn interpolate(from: Option<&str>, to: &Value, t: f64) -> Value {
    if t >= 1.0 {
        return to.clone();
    }
    let Some(from) = from else {
        return to.clone();
    };
    let target = to.render();
    match (split_number(from), split_number(&target)) {
        (Some((a, unit_a)), Some((b, unit_b))) if unit_a == unit_b || unit_a.is_empty() => {
            let n = a + (b - a) * t;
            if unit_b.is_empty() && matches!(to, Value::Number(_)) {
                Value::Number((n * 1e6).round() / 1e6)
            } else {
                Value::Str(format!("{}{unit_b}", format_number(n)))
            }
        }
        _ => Value::Str(from.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_endpoints() {
        for ease in [
            Ease::Linear,
            Ease::QuadIn,
            Ease::QuadOut,
            Ease::QuadInOut,
            Ease::CubicIn,
            Ease::CubicOut,
            Ease::CubicInOut,
            Ease::SinInOut,
        ] {
            assert!(ease.apply(0.0).abs() < 1e-9, "{ease}");
            assert!((ease.apply(1.0) - 1.0).abs() < 1e-9, "{ease}");
        }
        assert!((Ease::CubicInOut.apply(0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn ease_names() {
        assert_eq!("easeLinear".parse::<Ease>().unwrap(), Ease::Linear);
        assert_eq!("cubic".parse::<Ease>().unwrap(), Ease::CubicInOut);
        assert_eq!("quadOut".parse::<Ease>().unwrap(), Ease::QuadOut);
        assert!("bounce".parse::<Ease>().is_err());
    }

    #[test]
    fn interpolates_units() {
        assert_eq!(
            interpolate(Some("0px"), &Value::from("10px"), 0.5),
            Value::from("5px")
        );
        assert_eq!(interpolate(Some("40"), &Value::from(920), 0.5), Value::from(480));
        assert_eq!(
            interpolate(Some("red"), &Value::from("blue"), 0.5),
            Value::from("red")
        );
        assert_eq!(interpolate(None, &Value::from("blue"), 0.5), Value::from("blue"));
        assert_eq!(
            interpolate(Some("red"), &Value::from("blue"), 1.0),
            Value::from("blue")
        );
    }
}
