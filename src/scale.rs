//! Microtonal scales.
//!
//! A [`Scale`] is a 128-entry table mapping MIDI keys to pitch multipliers
//! relative to key 60. Tables are built from an ordered interval list (one
//! period of the scale) and repeated across the keyboard in both directions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScaleError;

/// Number of MIDI keys covered by a scale table.
pub const KEY_COUNT: usize = 128;

/// Key whose multiplier is always 1.0.
pub const CENTER_KEY: usize = 60;

const EQUAL_TEMPERAMENT_DESCRIPTION: &str = "12-tone equal temperament";

/// One step of a scale period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Interval {
    /// A frequency ratio `num/den`.
    Ratio { num: f64, den: f64 },
    /// A size in cents.
    Cents { cents: f64 },
    /// A plain frequency multiplier.
    Multiplier { value: f64 },
}

impl Interval {
    /// The pitch multiplier this interval stands for.
    pub fn multiplier(&self) -> f64 {
        match *self {
            Interval::Ratio { num, den } => num / den,
            Interval::Cents { cents } => 2.0_f64.powf(cents / 1200.0),
            Interval::Multiplier { value } => value,
        }
    }

    /// Parse a single interval line, reporting `line` on failure.
    pub fn parse_line(text: &str, line: usize) -> Result<Self, ScaleError> {
        let filtered: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let invalid = || ScaleError::InvalidInterval {
            line,
            text: text.trim().to_string(),
        };

        let interval = if let Some((num, den)) = filtered.split_once('/') {
            let num = num.parse::<f64>().map_err(|_| invalid())?;
            let den = den.parse::<f64>().map_err(|_| invalid())?;
            Interval::Ratio { num, den }
        } else if filtered.contains('.') {
            let cents = filtered.parse::<f64>().map_err(|_| invalid())?;
            Interval::Cents { cents }
        } else {
            let value = filtered.parse::<f64>().map_err(|_| invalid())?;
            Interval::Multiplier { value }
        };

        let multiplier = interval.multiplier();
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ScaleError::NonPositiveInterval {
                line,
                text: text.trim().to_string(),
            });
        }
        Ok(interval)
    }
}

impl FromStr for Interval {
    type Err = ScaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::parse_line(s, 0)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Ratio { num, den } => write!(f, "{num}/{den}"),
            Interval::Cents { cents } => write!(f, "{cents:.5}"),
            Interval::Multiplier { value } => write!(f, "{value}"),
        }
    }
}

/// What a scale was built from. This is what gets persisted: rebuilding from
/// the same source always yields the same table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScaleSource {
    #[default]
    EqualTemperament,
    Intervals {
        description: String,
        intervals: Vec<Interval>,
    },
}

/// A 128-key pitch multiplier table.
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    table: [f64; KEY_COUNT],
    description: String,
    is_default: bool,
    source: ScaleSource,
}

impl Default for Scale {
    fn default() -> Self {
        Scale::equal_temperament()
    }
}

impl Scale {
    /// Standard 12-tone equal temperament.
    pub fn equal_temperament() -> Self {
        let mut table = [0.0; KEY_COUNT];
        for (key, value) in table.iter_mut().enumerate() {
            *value = 2.0_f64.powf((key as f64 - CENTER_KEY as f64) / 12.0);
        }
        Scale {
            table,
            description: EQUAL_TEMPERAMENT_DESCRIPTION.to_string(),
            is_default: true,
            source: ScaleSource::EqualTemperament,
        }
    }

    /// Build a table from one period of intervals.
    ///
    /// `intervals[i]` is the multiplier of step `i + 1` above the period's
    /// root; the last entry is the period itself (e.g. `2/1` for an octave).
    pub fn from_intervals(
        description: impl Into<String>,
        intervals: Vec<Interval>,
    ) -> Result<Self, ScaleError> {
        if intervals.is_empty() {
            return Err(ScaleError::Empty);
        }
        for (i, interval) in intervals.iter().enumerate() {
            let m = interval.multiplier();
            if !m.is_finite() || m <= 0.0 {
                return Err(ScaleError::NonPositiveInterval {
                    line: i + 1,
                    text: interval.to_string(),
                });
            }
        }

        let table = build_table(&intervals);
        let description = description.into();
        let mut scale = Scale {
            table,
            description: description.clone(),
            is_default: false,
            source: ScaleSource::Intervals {
                description,
                intervals,
            },
        };
        scale.is_default = scale.matches_equal_temperament();
        Ok(scale)
    }

    /// Rebuild a scale from a persisted source.
    pub fn from_source(source: &ScaleSource) -> Result<Self, ScaleError> {
        match source {
            ScaleSource::EqualTemperament => Ok(Scale::equal_temperament()),
            ScaleSource::Intervals {
                description,
                intervals,
            } => Scale::from_intervals(description.clone(), intervals.clone()),
        }
    }

    /// Parse Scala-format text.
    ///
    /// The first non-comment line is the description, the second the note
    /// count, and every following line one interval. Lines starting with `!`
    /// are comments; whitespace inside lines is ignored.
    pub fn parse(text: &str) -> Result<Self, ScaleError> {
        let mut description: Option<String> = None;
        let mut declared: Option<usize> = None;
        let mut intervals = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim();
            if trimmed.starts_with('!') {
                continue;
            }
            if description.is_none() {
                // The description line may legitimately be empty.
                description = Some(trimmed.to_string());
                continue;
            }
            if trimmed.is_empty() {
                continue;
            }
            if declared.is_none() {
                let count: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
                let count = count.parse::<usize>().map_err(|_| ScaleError::InvalidCount {
                    line: line_number,
                    text: trimmed.to_string(),
                })?;
                declared = Some(count);
                continue;
            }
            intervals.push(Interval::parse_line(trimmed, line_number)?);
        }

        let declared = declared.ok_or(ScaleError::MissingCount)?;
        if declared == 0 {
            return Err(ScaleError::Empty);
        }
        if declared != intervals.len() {
            return Err(ScaleError::CountMismatch {
                declared,
                found: intervals.len(),
            });
        }
        Scale::from_intervals(description.unwrap_or_default(), intervals)
    }

    /// Pitch multiplier for `key`, relative to key 60. Keys above 127 clamp.
    #[inline]
    pub fn multiplier(&self, key: u8) -> f64 {
        self.table[(key as usize).min(KEY_COUNT - 1)]
    }

    /// The key-equivalent pitch this scale assigns to `key`, on the
    /// equal-tempered keyboard.
    pub fn corrected_key(&self, key: u8) -> f64 {
        self.multiplier(key).log2() * 12.0 + CENTER_KEY as f64
    }

    pub fn table(&self) -> &[f64; KEY_COUNT] {
        &self.table
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> &ScaleSource {
        &self.source
    }

    /// Whether the table is indistinguishable from 12-tone equal temperament.
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    fn matches_equal_temperament(&self) -> bool {
        self.table.iter().enumerate().all(|(note, &value)| {
            let corrected = value.log2() * 12.0 + CENTER_KEY as f64;
            let key = corrected.round();
            let cents = ((corrected - key) * 100.0) as i64;
            key as i64 == note as i64 && cents.abs() <= 1
        })
    }
}

fn build_table(intervals: &[Interval]) -> [f64; KEY_COUNT] {
    let n = intervals.len();
    // Step 0 is unison so that step i lives at index i.
    let mut steps = Vec::with_capacity(n + 1);
    steps.push(1.0);
    steps.extend(intervals.iter().map(Interval::multiplier));

    let mut table = [0.0; KEY_COUNT];
    table[CENTER_KEY] = 1.0;

    for key in CENTER_KEY + 1..KEY_COUNT {
        let mut step = (key - CENTER_KEY) % n;
        if step == 0 {
            step = n;
        }
        table[key] = table[key - step] * steps[step];
    }

    for key in (0..CENTER_KEY).rev() {
        let below = CENTER_KEY - key;
        let step = (n - below % n) % n;
        let base = key + n - step;
        table[key] = table[base] / steps[n - step];
    }

    table
}
