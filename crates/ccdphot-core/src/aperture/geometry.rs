use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CcdError, Result};

/// Method-name key selecting an aperture shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApertureMethod {
    Circular,
    CircularAnnulus,
    Elliptical,
    EllipticalAnnulus,
}

impl ApertureMethod {
    pub const ALL: [ApertureMethod; 4] = [
        Self::Circular,
        Self::CircularAnnulus,
        Self::Elliptical,
        Self::EllipticalAnnulus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Circular => "circular",
            Self::CircularAnnulus => "circular_annulus",
            Self::Elliptical => "elliptical",
            Self::EllipticalAnnulus => "elliptical_annulus",
        }
    }

    /// Parameter keys this shape requires.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Self::Circular => &["r"],
            Self::CircularAnnulus => &["r_in", "r_out"],
            Self::Elliptical => &["a", "b", "theta"],
            Self::EllipticalAnnulus => &["a_in", "a_out", "b_out", "theta"],
        }
    }
}

impl fmt::Display for ApertureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApertureMethod {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| CcdError::UnsupportedMethod {
                kind: "aperture geometry",
                name: s.to_string(),
            })
    }
}

/// Aperture footprint, centred on each source position.
///
/// Lengths are in pixels; `theta` is the rotation of the semi-major axis
/// from the +x axis, in radians, counter-clockwise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ApertureGeometry {
    Circular { r: f64 },
    CircularAnnulus { r_in: f64, r_out: f64 },
    Elliptical { a: f64, b: f64, theta: f64 },
    EllipticalAnnulus {
        a_in: f64,
        a_out: f64,
        b_in: f64,
        b_out: f64,
        theta: f64,
    },
}

impl ApertureGeometry {
    /// Build a geometry from a method key and its parameter mapping.
    ///
    /// Keys not used by the shape are ignored. For the elliptical annulus a
    /// missing `b_in` defaults to `b_out * a_in / a_out`.
    pub fn from_params(method: ApertureMethod, params: &BTreeMap<String, f64>) -> Result<Self> {
        let get = |key: &str| {
            params.get(key).copied().ok_or_else(|| {
                CcdError::InvalidAperture(format!("{method} aperture requires parameter {key:?}"))
            })
        };
        let geometry = match method {
            ApertureMethod::Circular => Self::Circular { r: get("r")? },
            ApertureMethod::CircularAnnulus => Self::CircularAnnulus {
                r_in: get("r_in")?,
                r_out: get("r_out")?,
            },
            ApertureMethod::Elliptical => Self::Elliptical {
                a: get("a")?,
                b: get("b")?,
                theta: get("theta")?,
            },
            ApertureMethod::EllipticalAnnulus => {
                let a_in = get("a_in")?;
                let a_out = get("a_out")?;
                let b_out = get("b_out")?;
                let b_in = match params.get("b_in") {
                    Some(&b) => b,
                    None if a_out > 0.0 => b_out * a_in / a_out,
                    None => 0.0,
                };
                Self::EllipticalAnnulus {
                    a_in,
                    a_out,
                    b_in,
                    b_out,
                    theta: get("theta")?,
                }
            }
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn method(&self) -> ApertureMethod {
        match self {
            Self::Circular { .. } => ApertureMethod::Circular,
            Self::CircularAnnulus { .. } => ApertureMethod::CircularAnnulus,
            Self::Elliptical { .. } => ApertureMethod::Elliptical,
            Self::EllipticalAnnulus { .. } => ApertureMethod::EllipticalAnnulus,
        }
    }

    pub fn is_annulus(&self) -> bool {
        matches!(self, Self::CircularAnnulus { .. } | Self::EllipticalAnnulus { .. })
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(CcdError::InvalidAperture(format!("{name} must be positive, got {v}")))
            }
        };
        let finite = |name: &str, v: f64| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(CcdError::InvalidAperture(format!("{name} must be finite, got {v}")))
            }
        };
        match *self {
            Self::Circular { r } => positive("r", r),
            Self::CircularAnnulus { r_in, r_out } => {
                positive("r_in", r_in)?;
                positive("r_out", r_out)?;
                if r_out <= r_in {
                    return Err(CcdError::InvalidAperture(format!(
                        "r_out ({r_out}) must exceed r_in ({r_in})"
                    )));
                }
                Ok(())
            }
            Self::Elliptical { a, b, theta } => {
                positive("a", a)?;
                positive("b", b)?;
                finite("theta", theta)
            }
            Self::EllipticalAnnulus {
                a_in,
                a_out,
                b_in,
                b_out,
                theta,
            } => {
                positive("a_in", a_in)?;
                positive("a_out", a_out)?;
                positive("b_in", b_in)?;
                positive("b_out", b_out)?;
                finite("theta", theta)?;
                if a_out <= a_in || b_out <= b_in {
                    return Err(CcdError::InvalidAperture(format!(
                        "outer semi-axes ({a_out}, {b_out}) must exceed inner ({a_in}, {b_in})"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Whether the offset `(dx, dy)` from the centre lies in the footprint.
    /// For annuli this is the ring only.
    pub fn contains(&self, dx: f64, dy: f64) -> bool {
        match *self {
            Self::Circular { r } => dx * dx + dy * dy <= r * r,
            Self::CircularAnnulus { r_in, r_out } => {
                let d2 = dx * dx + dy * dy;
                d2 > r_in * r_in && d2 <= r_out * r_out
            }
            Self::Elliptical { a, b, theta } => in_ellipse(dx, dy, a, b, theta),
            Self::EllipticalAnnulus {
                a_in,
                a_out,
                b_in,
                b_out,
                theta,
            } => in_ellipse(dx, dy, a_out, b_out, theta) && !in_ellipse(dx, dy, a_in, b_in, theta),
        }
    }

    /// The region enclosed by an annulus' inner edge; `None` for bare apertures.
    pub fn inner(&self) -> Option<ApertureGeometry> {
        match *self {
            Self::CircularAnnulus { r_in, .. } => Some(Self::Circular { r: r_in }),
            Self::EllipticalAnnulus {
                a_in, b_in, theta, ..
            } => Some(Self::Elliptical {
                a: a_in,
                b: b_in,
                theta,
            }),
            _ => None,
        }
    }

    /// Exact geometric area in square pixels.
    pub fn area(&self) -> f64 {
        match *self {
            Self::Circular { r } => PI * r * r,
            Self::CircularAnnulus { r_in, r_out } => PI * (r_out * r_out - r_in * r_in),
            Self::Elliptical { a, b, .. } => PI * a * b,
            Self::EllipticalAnnulus {
                a_in,
                a_out,
                b_in,
                b_out,
                ..
            } => PI * (a_out * b_out - a_in * b_in),
        }
    }

    /// Radius of a circle enclosing the footprint.
    pub fn extent(&self) -> f64 {
        match *self {
            Self::Circular { r } => r,
            Self::CircularAnnulus { r_out, .. } => r_out,
            Self::Elliptical { a, b, .. } => a.max(b),
            Self::EllipticalAnnulus { a_out, b_out, .. } => a_out.max(b_out),
        }
    }
}

fn in_ellipse(dx: f64, dy: f64, a: f64, b: f64, theta: f64) -> bool {
    let (sin, cos) = theta.sin_cos();
    let u = dx * cos + dy * sin;
    let v = -dx * sin + dy * cos;
    (u / a).powi(2) + (v / b).powi(2) <= 1.0
}
