// Copyright 2022-2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Apodization (analysis window) functions for LPC estimation.

use std::cell::RefCell;
use std::f32::consts::PI;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::constant::qlpc::MAX_APODIZATIONS;

/// Analysis window descriptor.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
#[non_exhaustive]
pub enum Window {
    Bartlett,
    BartlettHann,
    Blackman,
    BlackmanHarris4Term92Db,
    Connes,
    Flattop,
    /// Gaussian window; `stddev` in `(0, 0.5]` relative to the half length.
    Gauss {
        stddev: f32,
    },
    Hamming,
    Hann,
    KaiserBessel,
    Nuttall,
    Rectangle,
    Triangle,
    /// Tukey window with the taper ratio `p` in `[0, 1]`.
    Tukey {
        p: f32,
    },
    /// Tukey window over `[start, end)` (relative positions) and zero elsewhere.
    PartialTukey {
        p: f32,
        start: f32,
        end: f32,
    },
    /// One outside `[start, end)` with Tukey tapers, zero inside.
    PunchoutTukey {
        p: f32,
        start: f32,
        end: f32,
    },
    Welch,
}

impl Default for Window {
    fn default() -> Self {
        Self::Tukey { p: 0.5 }
    }
}

#[inline]
fn cosine_sum(len: usize, coefs: &[f32]) -> Vec<f32> {
    let n_max = len.saturating_sub(1).max(1) as f32;
    (0..len)
        .map(|n| {
            let x = 2.0 * PI * n as f32 / n_max;
            coefs
                .iter()
                .enumerate()
                .map(|(k, c)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * c * (x * k as f32).cos()
                })
                .sum()
        })
        .collect()
}

#[inline]
fn hann_taper(i: i64, np: i64) -> f32 {
    0.5 - 0.5 * (PI * i as f32 / np as f32).cos()
}

fn tukey(len: usize, p: f32) -> Vec<f32> {
    if p <= 0.0 {
        return vec![1.0; len];
    }
    if p >= 1.0 {
        return Window::Hann.weights(len);
    }
    let l = len as i64;
    let np = (p / 2.0 * len as f32) as i64 - 1;
    let mut ret = vec![1.0f32; len];
    if np > 0 {
        for n in 0..=np {
            ret[n as usize] = hann_taper(n, np);
            ret[(l - np - 1 + n) as usize] = hann_taper(n + np, np);
        }
    }
    ret
}

fn partial_tukey(len: usize, p: f32, start: f32, end: f32) -> Vec<f32> {
    let l = len as i64;
    let start_n = ((start * len as f32) as i64).clamp(0, l);
    let end_n = ((end * len as f32) as i64).clamp(start_n, l);
    let np = (p / 2.0 * (end_n - start_n) as f32) as i64;
    let mut ret = vec![0.0f32; len];
    for n in start_n..end_n {
        let from_start = n - start_n + 1;
        let from_end = end_n - n;
        ret[n as usize] = if np > 0 && from_start < np {
            hann_taper(from_start, np)
        } else if np > 0 && from_end <= np {
            hann_taper(from_end, np)
        } else {
            1.0
        };
    }
    ret
}

fn punchout_tukey(len: usize, p: f32, start: f32, end: f32) -> Vec<f32> {
    let head = partial_tukey(len, p, 0.0, start);
    let tail = partial_tukey(len, p, end, 1.0);
    head.iter().zip(&tail).map(|(a, b)| a + b).collect()
}

impl Window {
    /// Computes the window weights for a block of `len` samples.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::apodization::*;
    /// let w = Window::Hann.weights(5);
    /// assert!(w[0].abs() < 1e-6);
    /// assert!((w[2] - 1.0).abs() < 1e-6);
    /// assert_eq!(Window::Rectangle.weights(3), vec![1.0; 3]);
    /// ```
    #[allow(clippy::too_many_lines)]
    pub fn weights(&self, len: usize) -> Vec<f32> {
        let n_max = len.saturating_sub(1).max(1) as f32;
        match *self {
            Self::Bartlett => (0..len)
                .map(|n| {
                    let x = 2.0 * n as f32 / n_max;
                    if x <= 1.0 {
                        x
                    } else {
                        2.0 - x
                    }
                })
                .collect(),
            Self::BartlettHann => (0..len)
                .map(|n| {
                    let r = n as f32 / n_max;
                    0.38f32.mul_add(
                        -(2.0 * PI * r).cos(),
                        0.48f32.mul_add(-(r - 0.5).abs(), 0.62),
                    )
                })
                .collect(),
            Self::Blackman => cosine_sum(len, &[0.42, 0.5, 0.08]),
            Self::BlackmanHarris4Term92Db => {
                cosine_sum(len, &[0.358_75, 0.488_29, 0.141_28, 0.011_68])
            }
            Self::Connes => {
                let half = len as f32 / 2.0;
                (0..len)
                    .map(|n| {
                        let k = (n as f32 - half) / half;
                        let v = 1.0 - k * k;
                        v * v
                    })
                    .collect()
            }
            Self::Flattop => cosine_sum(
                len,
                &[
                    0.215_578_95,
                    0.416_631_58,
                    0.277_263_16,
                    0.083_578_95,
                    0.006_947_368,
                ],
            ),
            Self::Gauss { stddev } => {
                let half = n_max / 2.0;
                (0..len)
                    .map(|n| {
                        let k = (n as f32 - half) / (stddev * half);
                        (-0.5 * k * k).exp()
                    })
                    .collect()
            }
            Self::Hamming => cosine_sum(len, &[0.54, 0.46]),
            Self::Hann => cosine_sum(len, &[0.5, 0.5]),
            Self::KaiserBessel => cosine_sum(len, &[0.402, 0.498, 0.098, 0.001]),
            Self::Nuttall => cosine_sum(len, &[0.363_581_9, 0.489_177_5, 0.136_599_5, 0.010_641_1]),
            Self::Rectangle => vec![1.0; len],
            Self::Triangle => {
                let denom = (len + 1) as f32;
                (1..=len)
                    .map(|n| {
                        let m = n.min(len + 1 - n);
                        2.0 * m as f32 / denom
                    })
                    .collect()
            }
            Self::Tukey { p } => tukey(len, p),
            Self::PartialTukey { p, start, end } => partial_tukey(len, p, start, end),
            Self::PunchoutTukey { p, start, end } => punchout_tukey(len, p, start, end),
            Self::Welch => {
                let half = n_max / 2.0;
                (0..len)
                    .map(|n| {
                        let k = (n as f32 - half) / half;
                        1.0 - k * k
                    })
                    .collect()
            }
        }
    }
}

fn parse_args(body: &str) -> Option<Vec<f32>> {
    let inner = body.strip_suffix(')')?;
    inner
        .split('/')
        .map(|s| s.trim().parse::<f32>().ok())
        .collect()
}

fn push_multiple_tukey<F>(dest: &mut Vec<Window>, args: &[f32], default_overlap: f32, make: F)
where
    F: Fn(f32, f32, f32) -> Window,
{
    let parts = args.first().copied().unwrap_or(1.0) as i32;
    let overlap = args.get(1).copied().unwrap_or(default_overlap).min(0.99);
    let p = args.get(2).copied().unwrap_or(0.2);
    if parts <= 1 {
        dest.push(Window::Tukey { p });
        return;
    }
    if dest.len() + parts as usize >= MAX_APODIZATIONS {
        return;
    }
    let overlap_units = 1.0 / (1.0 - overlap) - 1.0;
    let denom = parts as f32 + overlap_units;
    for m in 0..parts {
        let m = m as f32;
        dest.push(make(p, m / denom, (m + 1.0 + overlap_units) / denom));
    }
}

/// Parses an apodization spec string such as `"tukey(5e-1);partial_tukey(2)"`.
///
/// Entries are separated by `;`. Unknown names and out-of-range parameters
/// are skipped. At most [`MAX_APODIZATIONS`] windows are returned, and an
/// empty result falls back to `tukey(0.5)`.
///
/// # Examples
///
/// ```
/// # use flacodec::apodization::*;
/// let windows = parse_apodization("tukey(5e-1);partial_tukey(2)");
/// assert_eq!(windows.len(), 3);
/// assert_eq!(windows[0], Window::Tukey { p: 0.5 });
/// assert_eq!(parse_apodization("no_such_window"), vec![Window::default()]);
/// ```
pub fn parse_apodization(spec: &str) -> Vec<Window> {
    let mut ret: Vec<Window> = vec![];
    for entry in spec.split(';') {
        let entry = entry.trim();
        let (name, args) = match entry.find('(') {
            Some(pos) => (&entry[..pos], parse_args(&entry[pos + 1..])),
            None => (entry, Some(vec![])),
        };
        let Some(args) = args else {
            continue;
        };
        match (name, args.as_slice()) {
            ("bartlett", []) => ret.push(Window::Bartlett),
            ("bartlett_hann", []) => ret.push(Window::BartlettHann),
            ("blackman", []) => ret.push(Window::Blackman),
            ("blackman_harris_4term_92db", []) => ret.push(Window::BlackmanHarris4Term92Db),
            ("connes", []) => ret.push(Window::Connes),
            ("flattop", []) => ret.push(Window::Flattop),
            ("gauss", [stddev]) if *stddev > 0.0 && *stddev <= 0.5 => {
                ret.push(Window::Gauss { stddev: *stddev });
            }
            ("hamming", []) => ret.push(Window::Hamming),
            ("hann", []) => ret.push(Window::Hann),
            ("kaiser_bessel", []) => ret.push(Window::KaiserBessel),
            ("nuttall", []) => ret.push(Window::Nuttall),
            ("rectangle", []) => ret.push(Window::Rectangle),
            ("triangle", []) => ret.push(Window::Triangle),
            ("tukey", [p]) if (0.0..=1.0).contains(p) => ret.push(Window::Tukey { p: *p }),
            ("partial_tukey", args) if !args.is_empty() => {
                push_multiple_tukey(&mut ret, args, 0.1, |p, start, end| {
                    Window::PartialTukey { p, start, end }
                });
            }
            ("punchout_tukey", args) if !args.is_empty() => {
                push_multiple_tukey(&mut ret, args, 0.2, |p, start, end| {
                    Window::PunchoutTukey { p, start, end }
                });
            }
            ("welch", []) => ret.push(Window::Welch),
            _ => {
                log::debug!(target: "flacodec::apodization", "ignoring apodization entry {entry:?}");
            }
        }
        if ret.len() >= MAX_APODIZATIONS {
            ret.truncate(MAX_APODIZATIONS);
            break;
        }
    }
    if ret.is_empty() {
        ret.push(Window::default());
    }
    ret
}

type WindowCache = Vec<(usize, Window, Rc<[f32]>)>;

thread_local! {
    static WINDOW_CACHE: RefCell<WindowCache> = const { RefCell::new(Vec::new()) };
}

/// Returns the (cached) weights of `window` for blocks of length `len`.
pub fn get_window(window: &Window, len: usize) -> Rc<[f32]> {
    WINDOW_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some((_, _, w)) = cache.iter().find(|(l, w, _)| *l == len && w == window) {
            return Rc::clone(w);
        }
        let weights: Rc<[f32]> = Rc::from(window.weights(len));
        if cache.len() >= MAX_APODIZATIONS * 4 {
            cache.remove(0);
        }
        cache.push((len, *window, Rc::clone(&weights)));
        weights
    })
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::assert_close;

    use rstest::rstest;

    #[rstest]
    fn windows_are_bounded_and_sized(
        #[values(
            Window::Bartlett,
            Window::BartlettHann,
            Window::Blackman,
            Window::BlackmanHarris4Term92Db,
            Window::Connes,
            Window::Flattop,
            Window::Gauss { stddev: 0.25 },
            Window::Hamming,
            Window::Hann,
            Window::KaiserBessel,
            Window::Nuttall,
            Window::Rectangle,
            Window::Triangle,
            Window::Tukey { p: 0.5 },
            Window::PartialTukey { p: 0.2, start: 0.0, end: 0.6 },
            Window::PunchoutTukey { p: 0.2, start: 0.3, end: 0.6 },
            Window::Welch
        )]
        window: Window,
        #[values(1, 31, 4096)] len: usize,
    ) {
        let w = window.weights(len);
        assert_eq!(w.len(), len);
        for v in &w {
            assert!(v.is_finite());
            assert!(*v > -0.1 && *v < 1.01, "{window:?} {v}");
        }
    }

    #[test]
    fn tukey_window_shape() {
        let w = Window::Tukey { p: 0.5 }.weights(400);
        assert_close!(w[0], 0.0f32);
        assert_close!(w[399], 0.0f32);
        assert_close!(w[200], 1.0f32);
        for t in 0..200 {
            assert_close!(w[t], w[399 - t], 1e-4f32);
        }
        assert_eq!(Window::Tukey { p: 0.0 }.weights(8), vec![1.0; 8]);
        assert_eq!(Window::Tukey { p: 1.0 }.weights(8), Window::Hann.weights(8));
    }

    #[test]
    fn partial_and_punchout_tukey_are_complementary_in_support() {
        let partial = Window::PartialTukey {
            p: 0.2,
            start: 0.25,
            end: 0.75,
        }
        .weights(100);
        let punchout = Window::PunchoutTukey {
            p: 0.2,
            start: 0.25,
            end: 0.75,
        }
        .weights(100);
        for t in 0..100 {
            if (25..75).contains(&t) {
                assert_eq!(punchout[t], 0.0);
            } else {
                assert_eq!(partial[t], 0.0);
            }
        }
        assert_eq!(partial[50], 1.0);
        assert_eq!(punchout[10], 1.0);
    }

    #[test]
    fn parsing_presets() {
        let windows = parse_apodization("tukey(5e-1);partial_tukey(2);punchout_tukey(3)");
        assert_eq!(windows.len(), 6);
        assert!(matches!(windows[1], Window::PartialTukey { .. }));
        assert!(matches!(windows[5], Window::PunchoutTukey { .. }));
        if let Window::PartialTukey { start, end, p } = windows[2] {
            assert_close!(end, 1.0f32);
            assert!(start > 0.0 && start < 0.5);
            assert_close!(p, 0.2f32);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn parsing_rejects_bad_entries() {
        assert_eq!(
            parse_apodization("gauss(0.7);hann;tukey(2)"),
            vec![Window::Hann]
        );
        assert_eq!(parse_apodization(""), vec![Window::default()]);
        assert_eq!(
            parse_apodization("partial_tukey(1/0.5/0.3)"),
            vec![Window::Tukey { p: 0.3 }]
        );
        assert_eq!(parse_apodization("welch;welch(1)"), vec![Window::Welch]);
        let many = vec!["hann"; 40].join(";");
        assert_eq!(parse_apodization(&many).len(), MAX_APODIZATIONS);
    }

    #[test]
    fn window_cache_returns_same_weights() {
        let a = get_window(&Window::Welch, 64);
        let b = get_window(&Window::Welch, 64);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(&a[..], &Window::Welch.weights(64)[..]);
    }
}
