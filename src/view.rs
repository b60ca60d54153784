//! Mapping of trace time and thread lanes onto a zoomable 2D viewport.
//!
//! The horizontal axis passes through a fixed pipeline of coordinate
//! spaces: entry index, nanoseconds relative to the start of the trace,
//! compressed x (after the time scale), zoomed x (after the zoom factor)
//! and translated x (after the left frame). Every conversion below moves
//! exactly one step along that pipeline, and composite helpers are built
//! only from these single steps. The vertical axis maps thread lanes in
//! display order, with inactive lanes faded to a fraction of their normal
//! spacing.

use crate::intern::SystemThread;
use crate::store::TraceStore;

/// Vertical distance between two thread lanes at zoom factor 1.
pub const NORMAL_THREAD_SPACING: i32 = 30;

/// Lane distance of a fully faded-out thread at zoom factor 1.
pub const MIN_THREAD_SPACING: i32 = 2;

/// Multiplier applied per scaling step.
pub const ZOOM_STEP: f64 = 1.003125;

/// Pixels for one nanosecond at time scale 1: 400ns per pixel.
const BASE_PIXELS_PER_NANO: f64 = 0.0000004;

/// Fraction of the viewport reserved as frame around the data area.
const FRAME_SIZE_PERCENTAGE: f64 = 0.125;

/// Minimum frame, in case the viewport is small.
const MIN_FRAME_WIDTH: i32 = 64;
const MIN_FRAME_HEIGHT: i32 = 16;

/// The currently visible rectangle, in surface coordinates (the surface
/// includes the frame around the data area).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Viewport {
        Viewport {
            x,
            y,
            width,
            height,
        }
    }

    fn right(&self) -> i32 {
        self.x + self.width
    }
}

/// Capability hooks a pan/zoom host needs from its content: the current
/// content size and the four scaling steps. The host drives these from
/// scroll and button events without knowing the concrete content type.
pub trait Pannable {
    /// Width of the data area in pixels, excluding the frame.
    fn data_width(&self) -> i32;

    /// Height of the data area in pixels, excluding the frame.
    fn data_height(&self) -> i32;

    /// Widen the time axis by `cnt` steps, 0 for one larger step.
    fn expand(&mut self, cnt: u32);

    /// Narrow the time axis by `cnt` steps, 0 for one larger step.
    fn compress(&mut self, cnt: u32);

    /// Enlarge both axes by `cnt` steps, 0 for one larger step.
    fn zoom_in(&mut self, cnt: u32);

    /// Shrink both axes by `cnt` steps, 0 for one larger step.
    fn zoom_out(&mut self, cnt: u32);
}

/// Cached lane positions. Valid for one combination of lane spacing,
/// horizontal compression and visible x range; any change invalidates it.
struct LaneCache {
    spacing: i32,
    ppn: f64,
    x: i32,
    width: i32,
    y: Vec<i32>,
    shown: Vec<bool>,
}

impl LaneCache {
    fn stale() -> LaneCache {
        LaneCache {
            spacing: -1,
            ppn: -1.0,
            x: -1,
            width: -1,
            y: Vec::new(),
            shown: Vec::new(),
        }
    }
}

/// All view state for one trace: time scale, zoom factor, the frame
/// around the data area and the anchor remembered across scaling steps.
///
/// The data bounds used by the `Pannable` hooks are a snapshot taken by
/// `update_data`; call it after each store refresh.
pub struct ViewTransform {
    time_scale: f64,
    zoom_factor: f64,
    frame_left: i32,
    frame_right: i32,
    frame_top: i32,
    frame_bottom: i32,
    /// Surface size including the frame. Set by `adjust_pos`.
    width: i32,
    height: i32,
    /// Data bounds snapshot, see `update_data`.
    span_ns: i64,
    thread_count: usize,
    /// Scaling anchor, see `remember_for_scaling`.
    anchor_x: i32,
    anchor_y: i32,
    remembered_ns: i64,
    remembered_lane: f64,
    lanes: LaneCache,
}

impl Default for ViewTransform {
    fn default() -> Self {
        ViewTransform {
            time_scale: 1.0,
            zoom_factor: 1.0,
            frame_left: 0,
            frame_right: 0,
            frame_top: 0,
            frame_bottom: 0,
            width: -1,
            height: -1,
            span_ns: 0,
            thread_count: 0,
            anchor_x: 0,
            anchor_y: 0,
            remembered_ns: 0,
            remembered_lane: 0.0,
            lanes: LaneCache::stale(),
        }
    }
}

impl ViewTransform {
    pub fn new() -> ViewTransform {
        ViewTransform::default()
    }

    /// Refresh the data bounds snapshot from the store.
    pub fn update_data(&mut self, store: &TraceStore) {
        self.span_ns = store.nanos_max() as i64 - store.nanos_min() as i64;
        self.thread_count = store.thread_count();
    }

    /// Pixels for one nanosecond at the current time scale.
    pub fn pixels_per_nano(&self) -> f64 {
        BASE_PIXELS_PER_NANO * self.time_scale
    }

    /* single-step conversions along the horizontal pipeline */

    pub fn compress_x_f(&self, ns: f64) -> f64 {
        ns * self.pixels_per_nano()
    }

    pub fn compress_x(&self, ns: i64) -> i32 {
        (self.compress_x_f(ns as f64) + 0.5) as i32
    }

    pub fn uncompress_x_f(&self, compressed_x: f64) -> f64 {
        compressed_x / self.pixels_per_nano()
    }

    pub fn uncompress_x(&self, compressed_x: i32) -> i64 {
        self.uncompress_x_f(compressed_x as f64) as i64
    }

    pub fn zoom_f(&self, l: f64) -> f64 {
        l * self.zoom_factor
    }

    /// Zoom an integer length. A nonzero length never zooms below one
    /// pixel, and keeps its sign.
    pub fn zoom_len(&self, l: i32) -> i32 {
        let zl = (self.zoom_f(l as f64) + 0.5) as i32;
        match l {
            _ if l > 0 => zl.max(1),
            _ if l < 0 => zl.min(-1),
            _ => 0,
        }
    }

    pub fn unzoom_f(&self, zl: f64) -> f64 {
        zl / self.zoom_factor
    }

    pub fn unzoom_len(&self, zl: i32) -> i32 {
        (self.unzoom_f(zl as f64) + 0.5) as i32
    }

    pub fn translate_x(&self, zoomed_x: i32) -> i32 {
        zoomed_x + self.frame_left
    }

    pub fn untranslate_x(&self, translated_x: i32) -> i32 {
        translated_x - self.frame_left
    }

    /* composite conversions */

    /// Relative nanoseconds to a surface x coordinate.
    pub fn nanos_to_posx(&self, ns: i64) -> i32 {
        self.translate_x((self.zoom_f(self.compress_x_f(ns as f64)) + 0.5) as i32)
    }

    /// Surface x coordinate back to relative nanoseconds.
    pub fn posx_to_nanos(&self, x: i32) -> i64 {
        self.uncompress_x_f(self.unzoom_f(self.untranslate_x(x) as f64)) as i64
    }

    /// Relative nanoseconds to a zoomed x coordinate (no frame).
    pub fn nanos_to_zoom_x(&self, ns: i64) -> i32 {
        (self.zoom_f(self.compress_x_f(ns as f64)) + 0.5) as i32
    }

    /// Zoomed x coordinate back to relative nanoseconds.
    pub fn zoom_x_to_nanos(&self, zoomed_x: i32) -> i64 {
        self.uncompress_x_f(self.unzoom_f(zoomed_x as f64)) as i64
    }

    /// Entry index to a surface x coordinate.
    pub fn index_to_posx(&self, store: &TraceStore, at: usize) -> i32 {
        self.nanos_to_posx(store.rel_nanos(at))
    }

    pub fn left_frame(&self) -> i32 {
        self.frame_left
    }

    pub fn right_frame(&self) -> i32 {
        self.frame_right
    }

    pub fn top_frame(&self) -> i32 {
        self.frame_top
    }

    pub fn bottom_frame(&self) -> i32 {
        self.frame_bottom
    }

    /// Surface width including the frame.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Surface height including the frame.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Recompute the frame and surface size so the top left corner of the
    /// data area lands at `(posx, posy)`. Returns the surface origin the
    /// host should place the surface at.
    pub fn adjust_pos(&mut self, posx: i32, posy: i32, vp: Viewport) -> (i32, i32) {
        let w = self.data_width();
        let h = self.data_height();

        let fw = (vp.width as f64 * FRAME_SIZE_PERCENTAGE) as i32;
        let fh = (vp.height as f64 * FRAME_SIZE_PERCENTAGE) as i32;

        // make the frame large enough to cover the viewport
        let cw = (vp.width - w) / 2;
        let ch = (vp.height - h) / 2;
        self.frame_left = MIN_FRAME_WIDTH.max(fw).max(posx).max(cw);
        self.frame_right = MIN_FRAME_WIDTH.max(fw).max(cw - posx).max(cw);
        self.frame_top = MIN_FRAME_HEIGHT.max(fh).max(posy).max(ch);
        self.frame_bottom = MIN_FRAME_HEIGHT.max(fh).max(ch - posy).max(ch);

        self.width = self.frame_left + w + self.frame_right;
        self.height = self.frame_top + h + self.frame_bottom;

        (posx - self.frame_left, posy - self.frame_top)
    }

    /* lanes */

    fn ensure_lanes(&mut self, store: &TraceStore, vp: Viewport) {
        let spacing = 2 * self.zoom_len(NORMAL_THREAD_SPACING);
        let ppn = self.pixels_per_nano();
        let c = &self.lanes;
        if c.spacing == spacing
            && c.ppn == ppn
            && c.x == vp.x
            && c.width == vp.width
            && c.y.len() == store.thread_count()
        {
            return;
        }
        let n = store.thread_count();
        let mut y = Vec::with_capacity(n);
        let mut shown = Vec::with_capacity(n);
        let mut fy = spacing as f64;
        for lane in 0..n {
            let f = self.lane_fade(store, vp, lane);
            let yd = f * self.zoom_f(MIN_THREAD_SPACING as f64)
                + (1.0 - f) * self.zoom_f(NORMAL_THREAD_SPACING as f64);
            fy += yd / 2.0;
            y.push(fy as i32);
            fy += yd / 2.0;
            shown.push(f == 0.0);
        }
        self.lanes = LaneCache {
            spacing,
            ppn,
            x: vp.x,
            width: vp.width,
            y,
            shown,
        };
    }

    /// Fade fraction for the lane at display position `lane`: 0 for a
    /// fully shown thread, up to 1 as its nearest activity moves away
    /// from the visible x range. A thread currently on CPU, or with an
    /// activity transition inside the range, is never faded. Threads
    /// without any recorded activity are fully faded.
    pub fn lane_fade(&self, store: &TraceStore, vp: Viewport, lane: usize) -> f64 {
        let t = store.thread(store.display_order()[lane]);
        if t.actions.is_empty() {
            return 1.0;
        }
        let il = t.actions[self.action_at(store, t, vp.x)];
        let ir = t.actions[self.action_at(store, t, vp.right())];
        if il != ir || store.new_thread_at(il) == store.entities().thread_by_tid(t.tid) {
            return 0.0;
        }
        let xl = self.index_to_posx(store, il);
        let xr = self.index_to_posx(store, ir);
        let transition = (vp.width / 2).max(1);
        let fl = if xl < vp.x {
            transition.min(vp.x - xl) as f64 / transition as f64
        } else if xl <= vp.right() {
            0.0
        } else {
            1.0
        };
        let fr = if xr > vp.right() {
            transition.min(xr - vp.right()) as f64 / transition as f64
        } else if xr >= vp.x {
            0.0
        } else {
            1.0
        };
        fl.min(fr)
    }

    /// Is the lane at display position `lane` shown (not faded at all)?
    pub fn lane_shown(&mut self, store: &TraceStore, vp: Viewport, lane: usize) -> bool {
        self.ensure_lanes(store, vp);
        self.lanes.shown.get(lane).copied().unwrap_or(false)
    }

    /// Surface y coordinate of the lane at display position `lane`.
    ///
    /// Positions past the lane table continue downwards at the base
    /// spacing; negative positions clamp to the first lane.
    pub fn lane_y(&mut self, store: &TraceStore, vp: Viewport, lane: i64) -> i32 {
        self.lane_y0(store, vp, lane) + self.frame_top
    }

    fn lane_y0(&mut self, store: &TraceStore, vp: Viewport, lane: i64) -> i32 {
        self.ensure_lanes(store, vp);
        let spacing = self.lanes.spacing;
        let l = self.lanes.y.len() as i64;
        if l == 0 {
            return spacing * (lane.max(0) + 1) as i32;
        }
        if lane < l {
            self.lanes.y[lane.max(0) as usize]
        } else {
            self.lanes.y[(l - 1) as usize] + spacing * (lane - l) as i32
        }
    }

    /// Display position of the lane at surface y coordinate `y`, with the
    /// fraction of the space below it that `y` sits at.
    pub fn posy_to_lane(&mut self, store: &TraceStore, vp: Viewport, y: i32) -> f64 {
        let y = y - self.frame_top;
        self.ensure_lanes(store, vp);
        if self.lanes.y.is_empty() {
            return 0.0;
        }
        let mut ti = 0;
        while ti + 1 < self.lanes.y.len() && y >= self.lanes.y[ti + 1] {
            ti += 1;
        }
        let ty = self.lanes.y[ti];
        let delta = if ti + 1 < self.lanes.y.len() {
            (self.lanes.y[ti + 1] - ty) as f64
        } else {
            self.zoom_f(NORMAL_THREAD_SPACING as f64)
        };
        ti as f64 + (y - ty) as f64 / delta
    }

    /// Inverse of `posy_to_lane` under the current scaling factors.
    pub fn lane_to_posy(&mut self, store: &TraceStore, vp: Viewport, lane: f64) -> i32 {
        self.ensure_lanes(store, vp);
        if self.lanes.y.is_empty() {
            return self.frame_top;
        }
        let ti = (lane as i64).clamp(0, self.lanes.y.len() as i64 - 1) as usize;
        let ty = self.lanes.y[ti];
        let delta = if ti + 1 < self.lanes.y.len() {
            (self.lanes.y[ti + 1] - ty) as f64
        } else {
            self.zoom_f(NORMAL_THREAD_SPACING as f64)
        };
        (ty as f64 + (lane - ti as f64) * delta) as i32 + self.frame_top
    }

    /// Display position of the lane at surface y coordinate `y`, clamped
    /// to the first and last lane.
    pub fn lane_at(&mut self, store: &TraceStore, vp: Viewport, y: i32) -> usize {
        let n = store.thread_count();
        if n == 0 {
            return 0;
        }
        let mut res = 0;
        while res < n - 1 && y > self.lane_y(store, vp, res as i64) {
            res += 1;
        }
        res
    }

    /* lookup by x position */

    /// Position in `t.actions` of the last action at or left of surface
    /// coordinate `x`; 0 if all actions are to the right or there are
    /// none.
    pub fn action_at(&self, store: &TraceStore, t: &SystemThread, x: i32) -> usize {
        self.position_at(store, &t.actions, x)
    }

    /// Position in the gap list of the last gap at or left of surface
    /// coordinate `x`; 0 if all gaps are to the right or there are none.
    pub fn gap_at(&self, store: &TraceStore, x: i32) -> usize {
        self.position_at(store, store.gaps(), x)
    }

    fn position_at(&self, store: &TraceStore, entries: &[usize], x: i32) -> usize {
        if entries.is_empty() {
            return 0;
        }
        let mut al = 0i64;
        let mut ar = entries.len() as i64 - 1;
        let mut res = 0usize;
        while al < ar {
            let am = (al + ar) / 2;
            let mx = self.index_to_posx(store, entries[am as usize]);
            if mx <= x {
                res = am as usize;
                al = am + 1;
            }
            if mx >= x {
                ar = am - 1;
            }
        }
        // the binary search can stop one short of the last fit
        while res + 1 < entries.len() && self.index_to_posx(store, entries[res + 1]) <= x {
            res += 1;
        }
        res
    }

    /* scaling anchor */

    /// Record the data under the surface point `(posx, posy)` so it can
    /// be put back there after scaling steps via `recall_pos`.
    pub fn remember_for_scaling(&mut self, store: &TraceStore, vp: Viewport, posx: i32, posy: i32) {
        self.anchor_x = posx;
        self.anchor_y = posy;
        self.remembered_ns = self.posx_to_nanos(posx);
        self.remembered_lane = self.posy_to_lane(store, vp, posy);
    }

    /// Record the center of the viewport, the usual scaling anchor.
    pub fn remember_center(&mut self, store: &TraceStore, vp: Viewport) {
        self.remember_for_scaling(store, vp, vp.x + vp.width / 2, vp.y + vp.height / 2);
    }

    fn recall_x(&self) -> i32 {
        self.nanos_to_zoom_x(self.remembered_ns)
    }

    fn recall_y(&mut self, store: &TraceStore, vp: Viewport) -> i32 {
        self.lane_to_posy(store, vp, self.remembered_lane) - self.frame_top
    }

    /// Re-adjust the frame after scaling so the remembered data point
    /// lands back under the anchor. Returns the new surface origin.
    pub fn recall_pos(&mut self, store: &TraceStore, vp: Viewport) -> (i32, i32) {
        let posx = self.anchor_x - self.recall_x();
        let posy = self.anchor_y - self.recall_y(store, vp);
        self.adjust_pos(posx, posy, vp)
    }
}

impl Pannable for ViewTransform {
    fn data_width(&self) -> i32 {
        self.nanos_to_zoom_x(self.span_ns)
    }

    fn data_height(&self) -> i32 {
        self.zoom_len(NORMAL_THREAD_SPACING * (self.thread_count as i32 + 3))
    }

    fn expand(&mut self, cnt: u32) {
        let cnt = if cnt == 0 { 10 } else { cnt };
        let step = ZOOM_STEP.powi(cnt as i32);
        if (self.width as f64) * step < i32::MAX as f64 {
            self.time_scale *= step;
        }
    }

    fn compress(&mut self, cnt: u32) {
        let cnt = if cnt == 0 { 10 } else { cnt };
        let step = ZOOM_STEP.powi(cnt as i32);
        if (self.width as f64) / step >= 256.0 {
            self.time_scale /= step;
        }
    }

    fn zoom_in(&mut self, cnt: u32) {
        let cnt = if cnt == 0 { 10 } else { cnt };
        let step = ZOOM_STEP.powi(cnt as i32);
        if self.data_height() < 1_000_000 && (self.width as f64) < i32::MAX as f64 / step {
            self.zoom_factor *= step;
        }
    }

    fn zoom_out(&mut self, cnt: u32) {
        let cnt = if cnt == 0 { 10 } else { cnt };
        let step = ZOOM_STEP.powi(cnt as i32);
        if self.zoom_len(NORMAL_THREAD_SPACING) > 3 && self.width > 100 {
            self.zoom_factor /= step;
        }
    }
}
