//! Constrained camera and viewport coordinate transforms.
//!
//! The camera value itself lives in the store (as a [`CameraRecord`]);
//! this module owns the constraint configuration and the pure math:
//! `viewport = (page - camera.xy) * camera.z`.
//!
//! [`CameraRecord`]: crate::records::CameraRecord

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Pan + zoom state. `z` is the zoom factor (1.0 = 1:1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 1.0 }
    }
}

/// Named zoom presets for initial/base zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZoomPreset {
    /// Fit the constraint bounds to the padded viewport.
    FitMax,
    /// 1:1.
    #[default]
    Default,
}

/// How the camera behaves relative to the constraint bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitBehavior {
    /// The viewport may not show area outside the bounds beyond the
    /// padding; axes where the bounds are smaller than the padded
    /// viewport are pinned at `origin`.
    Contain,
    /// No positional constraint.
    #[default]
    Free,
}

/// Page-space bounds the camera is constrained against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConstraints {
    /// Page-space rectangle to keep in view.
    pub bounds: Rect,
    /// Screen-space margin kept around the bounds.
    pub padding: Vec2,
    /// Where smaller-than-viewport bounds sit, per axis (0.5 = centered).
    pub origin: Point,
    /// Zoom applied when the camera is reset.
    pub initial_zoom: ZoomPreset,
    /// Zoom that step-wise zoom commands are relative to.
    pub base_zoom: ZoomPreset,
    pub behavior: FitBehavior,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            bounds: Rect::new(0.0, 0.0, 0.0, 0.0),
            padding: Vec2::ZERO,
            origin: Point::new(0.5, 0.5),
            initial_zoom: ZoomPreset::default(),
            base_zoom: ZoomPreset::default(),
            behavior: FitBehavior::default(),
        }
    }
}

/// Configuration for the camera manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraOptions {
    pub constraints: Option<CameraConstraints>,
    /// Ascending zoom stops for step-wise zoom; also clamps continuous zoom.
    pub zoom_steps: Vec<f64>,
    /// Scalar applied to continuous zoom deltas.
    pub zoom_speed: f64,
    /// Scalar applied to continuous pan deltas.
    pub pan_speed: f64,
    /// Disables user-driven camera changes entirely.
    pub is_locked: bool,
    /// Whether camera commits produce history entries. Off by default so
    /// panning does not pollute undo.
    pub record_in_history: bool,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            constraints: None,
            zoom_steps: vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0],
            zoom_speed: 1.0,
            pan_speed: 1.0,
            is_locked: false,
            record_in_history: false,
        }
    }
}

/// Owns the camera options and the viewport screen bounds, and clamps
/// camera values into the constrained region.
#[derive(Debug, Clone)]
pub struct CameraManager {
    options: CameraOptions,
    viewport: Rect,
}

impl Default for CameraManager {
    fn default() -> Self {
        Self {
            options: CameraOptions::default(),
            viewport: Rect::new(0.0, 0.0, 800.0, 600.0),
        }
    }
}

impl CameraManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &CameraOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: CameraOptions) {
        self.options = options;
    }

    /// Current viewport screen bounds.
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    /// The zoom that fits the constraint bounds inside the padded viewport.
    pub fn fit_zoom(&self) -> f64 {
        let Some(c) = &self.options.constraints else {
            return 1.0;
        };
        if c.bounds.width() <= 0.0 || c.bounds.height() <= 0.0 {
            return 1.0;
        }
        let usable_w = (self.viewport.width() - 2.0 * c.padding.x).max(1.0);
        let usable_h = (self.viewport.height() - 2.0 * c.padding.y).max(1.0);
        (usable_w / c.bounds.width()).min(usable_h / c.bounds.height())
    }

    fn preset_zoom(&self, preset: ZoomPreset) -> f64 {
        match preset {
            ZoomPreset::FitMax => self.fit_zoom(),
            ZoomPreset::Default => 1.0,
        }
    }

    /// The camera produced by a reset: initial zoom, bounds at `origin`.
    pub fn initial_camera(&self) -> Camera {
        let z = self
            .options
            .constraints
            .as_ref()
            .map(|c| self.preset_zoom(c.initial_zoom))
            .unwrap_or(1.0);
        self.constrain(Camera { x: 0.0, y: 0.0, z })
    }

    /// Clamp a proposed camera into the constrained region. With no
    /// constraints only the zoom steps bound `z`.
    pub fn constrain(&self, camera: Camera) -> Camera {
        let mut z = camera.z;
        if let (Some(first), Some(last)) =
            (self.options.zoom_steps.first(), self.options.zoom_steps.last())
        {
            z = z.clamp(*first, *last);
        }

        let Some(c) = &self.options.constraints else {
            return Camera { x: camera.x, y: camera.y, z };
        };
        if c.behavior != FitBehavior::Contain {
            return Camera { x: camera.x, y: camera.y, z };
        }

        // Contained cameras may not zoom out past the fit zoom.
        z = z.max(self.fit_zoom());

        let x = constrain_axis(
            camera.x,
            c.bounds.x0,
            c.bounds.width(),
            self.viewport.width(),
            c.padding.x,
            c.origin.x,
            z,
        );
        let y = constrain_axis(
            camera.y,
            c.bounds.y0,
            c.bounds.height(),
            self.viewport.height(),
            c.padding.y,
            c.origin.y,
            z,
        );
        Camera { x, y, z }
    }

    /// Pan by a screen-space delta, scaled by `pan_speed`.
    pub fn panned(&self, camera: Camera, delta: Vec2) -> Camera {
        let moved = Camera {
            x: camera.x + delta.x * self.options.pan_speed / camera.z,
            y: camera.y + delta.y * self.options.pan_speed / camera.z,
            z: camera.z,
        };
        self.constrain(moved)
    }

    /// Continuous zoom around a fixed viewport anchor point.
    pub fn zoomed(&self, camera: Camera, factor: f64, anchor: Point) -> Camera {
        let factor = 1.0 + (factor - 1.0) * self.options.zoom_speed;
        let target = self.constrain(Camera { z: camera.z * factor, ..camera });
        anchored(camera, target.z, anchor, self)
    }

    /// Step to the next zoom stop above the current zoom.
    pub fn zoom_in_step(&self, camera: Camera, anchor: Point) -> Camera {
        let next = self
            .options
            .zoom_steps
            .iter()
            .copied()
            .find(|&s| s > camera.z + 1e-9)
            .unwrap_or(camera.z);
        anchored(camera, self.constrain(Camera { z: next, ..camera }).z, anchor, self)
    }

    /// Step to the next zoom stop below the current zoom.
    pub fn zoom_out_step(&self, camera: Camera, anchor: Point) -> Camera {
        let next = self
            .options
            .zoom_steps
            .iter()
            .rev()
            .copied()
            .find(|&s| s < camera.z - 1e-9)
            .unwrap_or(camera.z);
        anchored(camera, self.constrain(Camera { z: next, ..camera }).z, anchor, self)
    }
}

/// Re-anchor a zoom change so the page point under `anchor` stays put,
/// then clamp the result.
fn anchored(camera: Camera, new_z: f64, anchor: Point, manager: &CameraManager) -> Camera {
    let page = viewport_to_page(anchor, camera);
    let moved = Camera {
        x: page.x - anchor.x / new_z,
        y: page.y - anchor.y / new_z,
        z: new_z,
    };
    manager.constrain(moved)
}

/// Clamp one camera axis under `Contain` behavior.
///
/// When the bounds (at zoom `z`) overflow the padded viewport the camera
/// may pan freely within them; when they fit, the axis is pinned so the
/// bounds sit at `origin` inside the padded area.
fn constrain_axis(
    cam: f64,
    bounds_min: f64,
    bounds_len: f64,
    viewport_len: f64,
    padding: f64,
    origin: f64,
    z: f64,
) -> f64 {
    let usable = viewport_len - 2.0 * padding;
    let screen_len = bounds_len * z;
    if screen_len <= usable {
        // Pinned: bounds start renders at padding + leftover * origin.
        bounds_min - (padding + (usable - screen_len) * origin) / z
    } else {
        let lo = bounds_min - padding / z;
        let hi = bounds_min + bounds_len - (viewport_len - padding) / z;
        cam.clamp(lo, hi)
    }
}

/// Pure page -> viewport transform.
pub fn page_to_viewport(point: Point, camera: Camera) -> Point {
    Point::new((point.x - camera.x) * camera.z, (point.y - camera.y) * camera.z)
}

/// Pure viewport -> page transform.
pub fn viewport_to_page(point: Point, camera: Camera) -> Point {
    Point::new(point.x / camera.z + camera.x, point.y / camera.z + camera.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contained() -> CameraManager {
        let mut manager = CameraManager::new();
        manager.set_viewport(Rect::new(0.0, 0.0, 800.0, 600.0));
        manager.set_options(CameraOptions {
            constraints: Some(CameraConstraints {
                bounds: Rect::new(0.0, 0.0, 400.0, 300.0),
                padding: Vec2::new(32.0, 64.0),
                origin: Point::new(0.5, 0.5),
                initial_zoom: ZoomPreset::FitMax,
                base_zoom: ZoomPreset::Default,
                behavior: FitBehavior::Contain,
            }),
            ..CameraOptions::default()
        });
        manager
    }

    #[test]
    fn test_transform_roundtrip() {
        let camera = Camera { x: 13.0, y: -7.0, z: 2.5 };
        let page = Point::new(120.0, 45.0);
        let vp = page_to_viewport(page, camera);
        let back = viewport_to_page(vp, camera);
        assert!((back.x - page.x).abs() < 1e-9);
        assert!((back.y - page.y).abs() < 1e-9);
    }

    #[test]
    fn test_transform_formula() {
        let camera = Camera { x: 10.0, y: 20.0, z: 2.0 };
        let vp = page_to_viewport(Point::new(15.0, 25.0), camera);
        assert_eq!(vp, Point::new(10.0, 10.0));
    }

    #[test]
    fn test_fit_zoom() {
        let manager = contained();
        // usable 736x472 over 400x300 bounds: min(1.84, 1.5733...)
        assert!((manager.fit_zoom() - 472.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_contain_blocks_zoom_below_fit() {
        let manager = contained();
        let clamped = manager.constrain(Camera { x: 0.0, y: 0.0, z: 0.1 });
        assert!((clamped.z - manager.fit_zoom()).abs() < 1e-9);
    }

    #[test]
    fn test_contain_clamps_pan() {
        let manager = contained();
        // Zoomed in so the bounds overflow the viewport on both axes.
        let z = 4.0;
        let clamped = manager.constrain(Camera { x: 1e6, y: -1e6, z });
        // The padded region must still show bounds content: camera x may
        // not exceed bounds.x1 - (vw - px) / z, nor go below -px / z.
        let hi_x = 400.0 - (800.0 - 32.0) / z;
        assert!((clamped.x - hi_x).abs() < 1e-9);
        let lo_y = -64.0 / z;
        assert!((clamped.y - lo_y).abs() < 1e-9);
    }

    #[test]
    fn test_contain_pins_small_axis() {
        let manager = contained();
        // At fit zoom the y axis fills the padded viewport exactly and
        // the x axis has leftover space; x must be pinned centered
        // regardless of the requested pan.
        let z = manager.fit_zoom();
        let a = manager.constrain(Camera { x: -500.0, y: 0.0, z });
        let b = manager.constrain(Camera { x: 500.0, y: 0.0, z });
        assert!((a.x - b.x).abs() < 1e-9);
        // Bounds center maps to the viewport center.
        let center = page_to_viewport(Point::new(200.0, 150.0), a);
        assert!((center.x - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_initial_camera_fit_max() {
        let manager = contained();
        let camera = manager.initial_camera();
        assert!((camera.z - manager.fit_zoom()).abs() < 1e-9);
        // Whole bounds are visible inside the viewport.
        let tl = page_to_viewport(Point::new(0.0, 0.0), camera);
        let br = page_to_viewport(Point::new(400.0, 300.0), camera);
        assert!(tl.x >= 0.0 && tl.y >= 0.0);
        assert!(br.x <= 800.0 && br.y <= 600.0);
    }

    #[test]
    fn test_zoom_steps() {
        let mut manager = CameraManager::new();
        manager.set_options(CameraOptions::default());
        let camera = Camera { x: 0.0, y: 0.0, z: 1.0 };
        let zoomed = manager.zoom_in_step(camera, Point::new(0.0, 0.0));
        assert!((zoomed.z - 2.0).abs() < 1e-9);
        let back = manager.zoom_out_step(zoomed, Point::new(0.0, 0.0));
        assert!((back.z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let manager = CameraManager::new();
        let camera = Camera { x: 5.0, y: 5.0, z: 1.0 };
        let anchor = Point::new(200.0, 150.0);
        let page_before = viewport_to_page(anchor, camera);
        let zoomed = manager.zoomed(camera, 2.0, anchor);
        let page_after = viewport_to_page(anchor, zoomed);
        assert!((page_before.x - page_after.x).abs() < 1e-9);
        assert!((page_before.y - page_after.y).abs() < 1e-9);
    }
}
