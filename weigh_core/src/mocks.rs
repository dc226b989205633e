//! Test and helper sources for weigh_core.

use weigh_traits::{BoxError, SampleSource};

/// A source that always errors on read; useful when the scale is driven with
/// externally sampled raw values via `process_sample`.
pub struct NoopSource;

impl SampleSource for NoopSource {
    fn read_channel(&mut self, _channel: u8) -> Result<i32, BoxError> {
        Err(Box::new(std::io::Error::other("noop source")))
    }
}

/// Replays a fixed sequence of counts, repeating the last one forever.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    samples: Vec<i32>,
    pos: usize,
}

impl ScriptedSource {
    pub fn new(samples: Vec<i32>) -> Self {
        Self { samples, pos: 0 }
    }
}

impl SampleSource for ScriptedSource {
    fn read_channel(&mut self, _channel: u8) -> Result<i32, BoxError> {
        let v = self
            .samples
            .get(self.pos)
            .or_else(|| self.samples.last())
            .copied()
            .ok_or("scripted source is empty")?;
        self.pos = self.pos.saturating_add(1);
        Ok(v)
    }
}
