use crate::utilities::vector::Vector;
use crate::utilities::vector2_wide::Vector2Wide;
use crate::utilities::vector3_wide::Vector3Wide;

/// Wide 2x3 matrix stored as two wide row vectors. Holds the pair of
/// tangent-plane jacobian rows used by friction constraints.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Matrix2x3Wide {
    pub x: Vector3Wide,
    pub y: Vector3Wide,
}

impl Matrix2x3Wide {
    /// v * M, with v a wide 2-vector: combines the two rows.
    #[inline(always)]
    pub fn transform(v: &Vector2Wide, m: &Self) -> Vector3Wide {
        Vector3Wide {
            x: v.x * m.x.x + v.y * m.y.x,
            y: v.x * m.x.y + v.y * m.y.y,
            z: v.x * m.x.z + v.y * m.y.z,
        }
    }

    /// M * v, with v a wide 3-vector: dots against the two rows.
    #[inline(always)]
    pub fn transform_by_rows(m: &Self, v: &Vector3Wide) -> Vector2Wide {
        Vector2Wide {
            x: Vector3Wide::dot(&m.x, v),
            y: Vector3Wide::dot(&m.y, v),
        }
    }
}

/// Wide symmetric 2x2 matrix; the tangent-plane effective mass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Symmetric2x2Wide {
    pub xx: Vector<f32>,
    pub yx: Vector<f32>,
    pub yy: Vector<f32>,
}

impl Symmetric2x2Wide {
    /// Sandwich m * s * mT for a 2x3 m, producing the symmetric 2x2 result.
    #[inline(always)]
    pub fn sandwich_scale(m: &Matrix2x3Wide, scale: Vector<f32>) -> Self {
        // s is scale * identity here; the general case never comes up.
        Self {
            xx: scale * Vector3Wide::dot(&m.x, &m.x),
            yx: scale * Vector3Wide::dot(&m.y, &m.x),
            yy: scale * Vector3Wide::dot(&m.y, &m.y),
        }
    }

    #[inline(always)]
    pub fn add(a: &Self, b: &Self) -> Self {
        Self {
            xx: a.xx + b.xx,
            yx: a.yx + b.yx,
            yy: a.yy + b.yy,
        }
    }

    #[inline(always)]
    pub fn invert_without_overlap(m: &Self) -> Self {
        let denom = Vector::splat(1.0) / (m.xx * m.yy - m.yx * m.yx);
        Self {
            xx: m.yy * denom,
            yx: -m.yx * denom,
            yy: m.xx * denom,
        }
    }

    #[inline(always)]
    pub fn transform(v: &Vector2Wide, m: &Self) -> Vector2Wide {
        Vector2Wide {
            x: v.x * m.xx + v.y * m.yx,
            y: v.x * m.yx + v.y * m.yy,
        }
    }
}
