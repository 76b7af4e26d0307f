//! Ranged integers and placement regions.
//!
//! Definitions describe coordinates, counts and chances either as a single
//! literal or an inclusive `[min, max]` pair; the concrete value is drawn
//! uniformly at apply time.

use rand::Rng;
use serde_json::{Map, Value};

use crate::loader::LoadError;

/// An inclusive integer range, resolved to a concrete value per draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntRange {
    pub lo: i32,
    pub hi: i32,
}

impl IntRange {
    pub const ONE: IntRange = IntRange { lo: 1, hi: 1 };
    pub const ZERO: IntRange = IntRange { lo: 0, hi: 0 };

    pub const fn new(lo: i32, hi: i32) -> Self {
        Self { lo, hi }
    }

    pub const fn fixed(v: i32) -> Self {
        Self { lo: v, hi: v }
    }

    /// Draw a concrete value. Deterministic when `lo == hi`.
    pub fn resolve(&self, rng: &mut impl Rng) -> i32 {
        if self.lo == self.hi {
            self.lo
        } else {
            let (lo, hi) = (self.lo.min(self.hi), self.lo.max(self.hi));
            rng.gen_range(lo..=hi)
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.lo == self.hi
    }

    /// Shift both bounds, used when a definition window or nested plan is
    /// placed at an offset.
    pub fn shifted(&self, d: i32) -> Self {
        Self { lo: self.lo + d, hi: self.hi + d }
    }

    /// Parse a literal integer or a 1- or 2-element array.
    pub fn from_value(v: &Value, context: &str) -> Result<Self, LoadError> {
        match v {
            Value::Number(n) => {
                let v = n.as_i64().ok_or_else(|| {
                    LoadError::structure(context, "expected an integer")
                })? as i32;
                Ok(Self::fixed(v))
            }
            Value::Array(arr) => {
                if arr.is_empty() || arr.len() > 2 {
                    return Err(LoadError::structure(
                        context,
                        "must be an array of 1 or 2 values",
                    ));
                }
                let get = |i: usize| -> Result<i32, LoadError> {
                    arr[i].as_i64().map(|v| v as i32).ok_or_else(|| {
                        LoadError::structure(context, "expected an integer")
                    })
                };
                let lo = get(0)?;
                let hi = if arr.len() == 2 { get(1)? } else { lo };
                Ok(Self::new(lo, hi))
            }
            _ => Err(LoadError::structure(
                context,
                "expected an integer or [min, max] array",
            )),
        }
    }

    /// Parse an optional member of a JSON object.
    pub fn from_obj(
        jo: &Map<String, Value>,
        key: &str,
        context: &str,
    ) -> Result<Option<Self>, LoadError> {
        match jo.get(key) {
            None => Ok(None),
            Some(v) => Self::from_value(v, context).map(Some),
        }
    }

    /// Parse a member of a JSON object, falling back to a default.
    pub fn from_obj_or(
        jo: &Map<String, Value>,
        key: &str,
        default: IntRange,
        context: &str,
    ) -> Result<Self, LoadError> {
        Ok(Self::from_obj(jo, key, context)?.unwrap_or(default))
    }

    /// Parse a required member of a JSON object.
    pub fn require(
        jo: &Map<String, Value>,
        key: &str,
        context: &str,
    ) -> Result<Self, LoadError> {
        Self::from_obj(jo, key, context)?.ok_or_else(|| {
            LoadError::structure(context, format!("missing required member \"{key}\""))
        })
    }
}

/// Where and how many times a placement executes: ranged X/Y plus a
/// ranged repeat count.
#[derive(Clone, Copy, Debug)]
pub struct PlaceRegion {
    pub x: IntRange,
    pub y: IntRange,
    pub repeat: IntRange,
}

impl PlaceRegion {
    pub fn from_obj(jo: &Map<String, Value>, context: &str) -> Result<Self, LoadError> {
        Ok(Self {
            x: IntRange::require(jo, "x", context)?,
            y: IntRange::require(jo, "y", context)?,
            repeat: IntRange::from_obj_or(jo, "repeat", IntRange::ONE, context)?,
        })
    }

    pub fn shifted(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.shifted(dx),
            y: self.y.shifted(dy),
            repeat: self.repeat,
        }
    }
}

/// Outcome of validating ranged coordinates against a grid extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundsCheck {
    /// Entirely inside the grid.
    Ok,
    /// The minimum corner falls outside: the entry belongs to another
    /// window of a shared-offset definition and is silently dropped.
    Skip,
    /// The minimum corner is inside but the range crosses the boundary.
    Reject,
}

/// Validate a ranged coordinate pair against a `size` x `size` grid.
pub fn check_bounds(x: &IntRange, y: &IntRange, size: usize) -> BoundsCheck {
    let size = size as i32;
    if x.lo < 0 || x.lo >= size || y.lo < 0 || y.lo >= size {
        return BoundsCheck::Skip;
    }
    if x.hi > size - 1 || y.hi > size - 1 || x.hi < 0 || y.hi < 0 {
        return BoundsCheck::Reject;
    }
    BoundsCheck::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    #[test]
    fn test_resolve_stays_in_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let range = IntRange::new(3, 9);
        for _ in 0..1_000 {
            let v = range.resolve(&mut rng);
            assert!((3..=9).contains(&v));
        }
    }

    #[test]
    fn test_resolve_fixed_is_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let range = IntRange::fixed(7);
        for _ in 0..100 {
            assert_eq!(range.resolve(&mut rng), 7);
        }
    }

    #[test]
    fn test_parse_literal_and_array_forms() {
        let jo = json!({ "a": 5, "b": [2, 8], "c": [4] });
        let jo = jo.as_object().unwrap();
        assert_eq!(IntRange::require(jo, "a", "t").unwrap(), IntRange::fixed(5));
        assert_eq!(IntRange::require(jo, "b", "t").unwrap(), IntRange::new(2, 8));
        assert_eq!(IntRange::require(jo, "c", "t").unwrap(), IntRange::fixed(4));
        assert!(IntRange::from_obj(jo, "missing", "t").unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_long_arrays() {
        let jo = json!({ "a": [1, 2, 3] });
        assert!(IntRange::require(jo.as_object().unwrap(), "a", "t").is_err());
    }

    #[test]
    fn test_check_bounds() {
        let size = 24;
        assert_eq!(
            check_bounds(&IntRange::new(0, 23), &IntRange::fixed(5), size),
            BoundsCheck::Ok
        );
        // Minimum corner outside the window: dropped, not an error.
        assert_eq!(
            check_bounds(&IntRange::fixed(30), &IntRange::fixed(5), size),
            BoundsCheck::Skip
        );
        assert_eq!(
            check_bounds(&IntRange::fixed(-1), &IntRange::fixed(5), size),
            BoundsCheck::Skip
        );
        // In-bounds minimum with a range crossing the edge: rejected.
        assert_eq!(
            check_bounds(&IntRange::new(20, 24), &IntRange::fixed(5), size),
            BoundsCheck::Reject
        );
    }
}
