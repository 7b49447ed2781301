//! Per-chunk volume analysis and the volume series fed to the chart.

/// Computes the mean absolute amplitude of a chunk of 16-bit little-endian PCM.
///
/// Each sample is normalized by 32768 so a full-scale chunk yields 1.0. The
/// value is not clamped. A trailing odd byte is ignored and an empty chunk
/// yields 0.
pub fn compute_volume(chunk: &[u8]) -> f32 {
    let sample_count = chunk.len() / 2;
    if sample_count == 0 {
        return 0.0;
    }

    let sum: f32 = chunk
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            (sample as f32 / 32768.0).abs()
        })
        .sum();

    sum / sample_count as f32
}

/// One point of the volume envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumePoint {
    /// Emission counter, starting at 0
    pub index: u64,
    /// Normalized volume of the chunk
    pub value: f32,
}

/// Append-only sequence of volume points plus the most recent level.
#[derive(Debug, Default, Clone)]
pub struct VolumeSeries {
    points: Vec<VolumePoint>,
    level: f32,
}

impl VolumeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one volume sample and makes it the current level.
    pub fn push(&mut self, value: f32) {
        let index = self.points.len() as u64;
        self.points.push(VolumePoint { index, value });
        self.level = value;
    }

    /// Drops every point and zeroes the current level.
    pub fn clear(&mut self) {
        self.points.clear();
        self.level = 0.0;
    }

    pub fn points(&self) -> &[VolumePoint] {
        &self.points
    }

    /// Most recent volume sample, 0 after a clear.
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the last `count` values, oldest first.
    pub fn tail(&self, count: usize) -> impl Iterator<Item = f32> + '_ {
        let start = self.points.len().saturating_sub(count);
        self.points[start..].iter().map(|p| p.value)
    }
}
