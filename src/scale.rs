//! Time scale generation: tick placement along the time axis and human
//! readable duration labels.

use crate::view::ViewTransform;

/// Minimum distance in pixels between two ticks on the scale.
pub const MIN_SCALE_WIDTH: i32 = 7;

const UNIT_NAMES: [&str; 9] = ["ns", "us", "ms", "s", "min", "h", "d", "a", "ka"];

/// Nanoseconds per unit, one longer than `UNIT_NAMES` so lookups for
/// "one unit up" never fall off the end. The kiloyear slot saturates;
/// everything beyond a year is labeled in years.
const UNIT_NS: [i64; 10] = [
    1,
    1_000,
    1_000_000,
    1_000_000_000,
    60_000_000_000,
    3_600_000_000_000,
    86_400_000_000_000,
    31_536_000_000_000_000,
    i64::MAX,
    i64::MAX,
];

/// One tick on the time scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Surface x coordinate of the tick.
    pub posx: i32,
    /// Relative nanoseconds at the tick.
    pub timens: i64,
    /// Every fifth grade gets a longer tick mark.
    pub major: bool,
    /// Every tenth grade gets a label, least significant unit first.
    pub label: Option<Vec<String>>,
}

/// Pick the tick distance in nanoseconds for the current compression:
/// the smallest value from the 1-2-4-5-10 ladder that keeps ticks at
/// least `MIN_SCALE_WIDTH` pixels apart.
pub fn pick_grade(vt: &ViewTransform) -> i64 {
    let mut grade: i64 = 1;
    let mut f = 0;
    loop {
        grade = if f % 4 != 2 { 2 * grade } else { 5 * grade / 4 };
        f += 1;
        if vt.compress_x(grade) >= MIN_SCALE_WIDTH || grade >= i64::MAX / 5 {
            return grade;
        }
    }
}

/// Generate the ticks for the surface x range `[x0, x1)` at the given
/// grade. The first tick sits at the first grade multiple at or right
/// of `x0`.
pub fn ticks(vt: &ViewTransform, x0: i32, x1: i32, grade: i64) -> Vec<Tick> {
    assert!(grade > 0, "grade must be positive");
    let mut res = Vec::new();
    let timens0 = vt.posx_to_nanos(x0);
    let mut timens = ((timens0 + (grade - 1)) / grade) * grade;
    let mut x = vt.nanos_to_posx(timens);
    while x < x1 {
        let steps = timens / grade;
        let label = if steps % 10 == 0 {
            Some(decompose(timens, grade * 10))
        } else {
            None
        };
        res.push(Tick {
            posx: x,
            timens,
            major: steps % 5 == 0,
            label,
        });
        timens += grade;
        x = vt.nanos_to_posx(timens);
    }
    res
}

/// Split `timens` into unit components, least significant first,
/// starting at the largest unit that divides `grade`. Always yields at
/// least one component, so 0 becomes "0ms" at a millisecond grade.
pub fn decompose(timens: i64, grade: i64) -> Vec<String> {
    assert!(grade > 0, "grade must be positive");
    let mut unit = 0;
    while grade % UNIT_NS[unit + 1] == 0 {
        unit += 1;
    }
    let mut res = Vec::new();
    let mut ns = timens;
    loop {
        let t = ns % UNIT_NS[unit + 1];
        res.push(format!("{}{}", t / UNIT_NS[unit], UNIT_NAMES[unit]));
        ns -= t;
        unit += 1;
        if ns <= 0 {
            return res;
        }
    }
}
