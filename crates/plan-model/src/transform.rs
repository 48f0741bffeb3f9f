//! 2D transforms and pan/zoom motion for stills.
//!
//! Transforms act in normalized canvas space: rotation and scale pivot on the
//! canvas center, translation is a fraction of canvas width/height.

use serde::{Deserialize, Serialize};

use crate::PlanError;

/// A 2D normalized point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const CENTER: Point2D = Point2D { x: 0.5, y: 0.5 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Linear interpolation between two points.
    pub fn lerp(a: &Point2D, b: &Point2D, t: f64) -> Point2D {
        let t = t.clamp(0.0, 1.0);
        Point2D {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        }
    }

    fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

impl Default for Point2D {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Affine transform `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

/// A transform split into scale, rotation, shear, and translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposed {
    pub scale_x: f64,
    pub scale_y: f64,
    /// Radians, counter-clockwise in math orientation.
    pub rotation: f64,
    pub shear: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl Transform2D {
    pub const IDENTITY: Transform2D = Transform2D {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn uniform_scale(s: f64) -> Self {
        Self::scale(s, s)
    }

    pub fn rotate(radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    /// Apply `self` first, then `next`.
    pub fn then(&self, next: &Transform2D) -> Transform2D {
        Transform2D {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            tx: next.a * self.tx + next.c * self.ty + next.tx,
            ty: next.b * self.tx + next.d * self.ty + next.ty,
        }
    }

    pub fn apply(&self, p: Point2D) -> Point2D {
        Point2D {
            x: self.a * p.x + self.c * p.y + self.tx,
            y: self.b * p.x + self.d * p.y + self.ty,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn is_identity(&self) -> bool {
        const EPS: f64 = 1e-9;
        (self.a - 1.0).abs() < EPS
            && self.b.abs() < EPS
            && self.c.abs() < EPS
            && (self.d - 1.0).abs() < EPS
            && self.tx.abs() < EPS
            && self.ty.abs() < EPS
    }

    /// Split into `rotation * [[sx, shear], [0, sy]]` plus translation.
    pub fn decompose(&self) -> Decomposed {
        let scale_x = self.a.hypot(self.b);
        if scale_x < 1e-12 {
            return Decomposed {
                scale_x: 0.0,
                scale_y: 0.0,
                rotation: 0.0,
                shear: 0.0,
                translate_x: self.tx,
                translate_y: self.ty,
            };
        }
        Decomposed {
            scale_x,
            scale_y: self.determinant() / scale_x,
            rotation: self.b.atan2(self.a),
            shear: (self.a * self.c + self.b * self.d) / scale_x,
            translate_x: self.tx,
            translate_y: self.ty,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), PlanError> {
        let values = [self.a, self.b, self.c, self.d, self.tx, self.ty];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PlanError::InvalidTransform(
                "transform contains non-finite values".to_string(),
            ));
        }
        if self.determinant().abs() < 1e-6 {
            return Err(PlanError::InvalidTransform(
                "transform is degenerate (zero area)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Pan/zoom motion across a still's duration ("Ken Burns").
///
/// Zoom factors are relative to the aspect-fit image (1.0 = whole image);
/// centers are normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanZoom {
    pub from_zoom: f64,
    pub to_zoom: f64,
    #[serde(default)]
    pub from_center: Point2D,
    #[serde(default)]
    pub to_center: Point2D,
}

impl PanZoom {
    /// Slow push-in toward the center.
    pub fn push_in(to_zoom: f64) -> Self {
        Self {
            from_zoom: 1.0,
            to_zoom,
            from_center: Point2D::CENTER,
            to_center: Point2D::CENTER,
        }
    }

    /// Zoom and center at progress `t` in `[0, 1]` (already eased).
    pub fn at(&self, t: f64) -> (f64, Point2D) {
        let t = t.clamp(0.0, 1.0);
        let zoom = self.from_zoom + (self.to_zoom - self.from_zoom) * t;
        (zoom, Point2D::lerp(&self.from_center, &self.to_center, t))
    }

    pub(crate) fn validate(&self) -> Result<(), PlanError> {
        for zoom in [self.from_zoom, self.to_zoom] {
            if !zoom.is_finite() || !(1.0..=10.0).contains(&zoom) {
                return Err(PlanError::InvalidTransform(format!(
                    "pan/zoom factor {zoom} outside [1, 10]"
                )));
            }
        }
        if !self.from_center.is_normalized() || !self.to_center.is_normalized() {
            return Err(PlanError::InvalidTransform(
                "pan/zoom centers must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
