#![no_main]
use libfuzzer_sys::fuzz_target;
use weigh_core::ParamCache;
use weigh_traits::{BlockStore, BoxError};

/// Every block reads back as the fuzz input.
struct Garbage(Vec<u8>);

impl BlockStore for Garbage {
    fn read_block(&mut self, _block: u16) -> Result<Vec<u8>, BoxError> {
        Ok(self.0.clone())
    }
    fn write_block(&mut self, _block: u16, _bytes: &[u8]) -> Result<(), BoxError> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    // Corrupt or truncated blocks must surface as errors, never panics.
    let mut cache = ParamCache::new(Garbage(data.to_vec()));
    let _ = cache.load_calibration();
    let _ = cache.load_scale();
});
