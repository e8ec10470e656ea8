//! Typed record variants held by the store.
//!
//! Records are immutable values: mutation is replace-by-id through a store
//! transaction. The set of kinds is closed; every variant has a statically
//! known shape that is validated on write.

use crate::camera::Camera;
use crate::id::{AssetId, CameraId, InstanceId, PageId, RecordId, RecordKind, ShapeId};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A shape's parent: the page it sits on, or another shape.
/// Parent chains form a tree; the store rejects cycles on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParentId {
    Page(PageId),
    Shape(ShapeId),
}

impl From<ParentId> for RecordId {
    fn from(parent: ParentId) -> Self {
        match parent {
            ParentId::Page(id) => RecordId::Page(id),
            ParentId::Shape(id) => RecordId::Shape(id),
        }
    }
}

const FRAC_DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const FRAC_BASE: usize = 36;

/// Fractional ordering key for siblings. Keys sort lexicographically;
/// [`FracIndex::between`] always finds a key strictly between two
/// neighbours, so inserting a sibling never renumbers the others.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FracIndex(String);

impl FracIndex {
    /// A key with nothing on either side.
    pub fn first() -> Self {
        Self::between(None, None)
    }

    /// A key strictly between `lo` and `hi`. `None` stands for the open
    /// end of the range. When both are given, `lo` must sort before `hi`.
    pub fn between(lo: Option<&FracIndex>, hi: Option<&FracIndex>) -> Self {
        let lo_str = lo.map(|k| k.0.as_str()).unwrap_or("");
        debug_assert!(hi.is_none_or(|hi| lo_str < hi.0.as_str()));
        FracIndex(midpoint(lo_str, hi.map(|k| k.0.as_str())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FracIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn digit_value(d: u8) -> usize {
    FRAC_DIGITS.iter().position(|&c| c == d).unwrap_or(0)
}

fn digit_char(v: usize) -> char {
    FRAC_DIGITS[v] as char
}

/// Midpoint of two base-36 fraction strings; `a` defaults to 0, a `None`
/// upper bound stands for 1 (exclusive). Never produces trailing zeros.
fn midpoint(a: &str, b: Option<&str>) -> String {
    match b {
        Some(b) => {
            let shared = a
                .bytes()
                .zip(b.bytes())
                .take_while(|(x, y)| x == y)
                .count();
            if shared > 0 {
                let rest_a = &a[shared..];
                return format!("{}{}", &b[..shared], midpoint(rest_a, Some(&b[shared..])));
            }
            let da = a.bytes().next().map(digit_value).unwrap_or(0);
            let db = b.bytes().next().map(digit_value).unwrap_or(FRAC_BASE);
            if db - da > 1 {
                digit_char((da + db) / 2).to_string()
            } else {
                // Adjacent leading digits: keep the lower one and recurse
                // into the open-ended tail of `a`.
                let rest_a = if a.is_empty() { "" } else { &a[1..] };
                format!("{}{}", digit_char(da), midpoint(rest_a, None))
            }
        }
        None => match a.bytes().next() {
            None => digit_char(FRAC_BASE / 2).to_string(),
            Some(d) if digit_value(d) == FRAC_BASE - 1 => {
                format!("{}{}", digit_char(FRAC_BASE - 1), midpoint(&a[1..], None))
            }
            Some(d) => digit_char((digit_value(d) + FRAC_BASE) / 2).to_string(),
        },
    }
}

/// Shape-specific properties, one variant per shape type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeProps {
    /// A freehand stroke; points are relative to the shape origin.
    Draw { points: Vec<Point> },
    /// A plain geometric box.
    Geo { w: f64, h: f64 },
    /// A raster image referencing an asset by id (weak reference).
    Image { w: f64, h: f64, asset: AssetId },
}

/// A shape on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub id: ShapeId,
    pub parent: ParentId,
    /// Z-order among siblings; lower keys render behind higher ones.
    pub index: FracIndex,
    pub x: f64,
    pub y: f64,
    /// Locked shapes reject geometric edits and are skipped by hit-testing.
    pub is_locked: bool,
    pub props: ShapeProps,
}

impl ShapeRecord {
    /// Page-space axis-aligned bounds.
    pub fn bounds(&self) -> Rect {
        match &self.props {
            ShapeProps::Draw { points } => {
                let mut rect = Rect::new(self.x, self.y, self.x, self.y);
                for p in points {
                    rect = rect.union_pt(Point::new(self.x + p.x, self.y + p.y));
                }
                rect
            }
            ShapeProps::Geo { w, h } | ShapeProps::Image { w, h, .. } => {
                Rect::new(self.x, self.y, self.x + w, self.y + h)
            }
        }
    }
}

/// Content metadata referenced by image shapes. Lives independently of
/// any referencing shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub mime_type: String,
    pub src: String,
    pub w: f64,
    pub h: f64,
}

/// A root container for shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: PageId,
    pub name: String,
}

/// The camera value, stored as a record so camera moves flow through the
/// same transactional machinery as everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub id: CameraId,
    pub camera: Camera,
}

/// Per-session editor state: the current page and the live selection.
/// Selection lives in the store so selection changes are undoable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub current_page: PageId,
    pub selected_shapes: Vec<ShapeId>,
}

/// The closed union of everything the store can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Shape(ShapeRecord),
    Asset(AssetRecord),
    Page(PageRecord),
    Camera(CameraRecord),
    Instance(InstanceRecord),
}

impl Record {
    pub fn id(&self) -> RecordId {
        match self {
            Record::Shape(r) => r.id.into(),
            Record::Asset(r) => r.id.into(),
            Record::Page(r) => r.id.into(),
            Record::Camera(r) => r.id.into(),
            Record::Instance(r) => r.id.into(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.id().kind()
    }

    /// Borrow as a shape, if this is one.
    pub fn as_shape(&self) -> Option<&ShapeRecord> {
        match self {
            Record::Shape(s) => Some(s),
            _ => None,
        }
    }
}
