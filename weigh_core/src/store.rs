//! Checksummed parameter blocks over a [`BlockStore`].
//!
//! Parameters are addressed by a flat id; `block = id / 100`, `slot = id % 100`.
//! A block is 100 eight-byte slots followed by a little-endian `u16` additive
//! checksum of the 800 slot bytes. Values are stored as explicit little-endian
//! `f64` or `i32` (low four bytes of the slot).
//!
//! The cache only changes after the backend confirmed a read or write, so a
//! failing store never leaves half-applied state behind.

use std::collections::BTreeMap;

use weigh_traits::BlockStore;

use crate::calibration::{CalibrationPoints, MAX_TEST_POINTS};
use crate::config::FilterCfg;
use crate::error::{CalibrationError, StorageError};
use crate::hw_error::map_store_error;
use crate::params::{ScaleParams, TradeMode, UnitSet};
use crate::units::Unit;
use crate::zero::ZeroState;

pub const SLOTS_PER_BLOCK: usize = 100;
pub const SLOT_BYTES: usize = 8;
pub const DATA_BYTES: usize = SLOTS_PER_BLOCK * SLOT_BYTES;
pub const BLOCK_BYTES: usize = DATA_BYTES + 2;

/// Calibration parameters (block 1).
pub mod ids {
    pub const CAL_VALID: u16 = 100;
    pub const CAL_ZERO: u16 = 101;
    /// Counts of test points 1..=4 at 102..=105.
    pub const CAL_COUNTS: u16 = 102;
    /// Loads of test points 1..=4 at 112..=115; 0 marks an empty point.
    pub const CAL_LOADS: u16 = 112;
    pub const CAL_GEO: u16 = 120;
    pub const USR_GEO: u16 = 121;
    pub const CAL_POINTS_IN_USE: u16 = 122;

    /// Scale and filter parameters (block 2).
    pub const SCALE_VALID: u16 = 200;
    pub const CAPACITY: u16 = 201;
    pub const INCREMENT: u16 = 202;
    pub const RANGES: u16 = 203;
    pub const TRADE_MODE: u16 = 204;
    pub const CAL_UNIT: u16 = 205;
    pub const PRIMARY_UNIT: u16 = 206;
    pub const SECONDARY_UNIT: u16 = 207;
    pub const CUSTOM_GRAMS: u16 = 208;
    pub const OVER_CAPACITY_INC: u16 = 209;
    pub const FILTER_CUTOFF_HZ: u16 = 210;
    pub const FILTER_POLES: u16 = 211;
}

const VALID_MARK: i32 = 0x5A5A;

pub fn encode_f64(v: f64) -> [u8; SLOT_BYTES] {
    v.to_le_bytes()
}

pub fn decode_f64(b: [u8; SLOT_BYTES]) -> f64 {
    f64::from_le_bytes(b)
}

pub fn encode_i32(v: i32) -> [u8; SLOT_BYTES] {
    let mut out = [0u8; SLOT_BYTES];
    out[..4].copy_from_slice(&v.to_le_bytes());
    out
}

pub fn decode_i32(b: [u8; SLOT_BYTES]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Wrapping 16-bit sum of the slot bytes.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

#[derive(Clone)]
struct Block {
    data: Box<[u8; DATA_BYTES]>,
}

impl Block {
    fn zeroed() -> Self {
        Self {
            data: Box::new([0u8; DATA_BYTES]),
        }
    }

    fn parse(block: u16, bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() != BLOCK_BYTES {
            return Err(StorageError::BlockLength {
                block,
                len: bytes.len(),
                expected: BLOCK_BYTES,
            });
        }
        let (data, tail) = bytes.split_at(DATA_BYTES);
        let stored = u16::from_le_bytes([tail[0], tail[1]]);
        let computed = checksum(data);
        if stored != computed {
            return Err(StorageError::Checksum {
                block,
                stored,
                computed,
            });
        }
        let mut b = Self::zeroed();
        b.data.copy_from_slice(data);
        Ok(b)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_BYTES);
        out.extend_from_slice(&self.data[..]);
        out.extend_from_slice(&checksum(&self.data[..]).to_le_bytes());
        out
    }

    fn slot(&self, slot: usize) -> [u8; SLOT_BYTES] {
        let mut out = [0u8; SLOT_BYTES];
        out.copy_from_slice(&self.data[slot * SLOT_BYTES..(slot + 1) * SLOT_BYTES]);
        out
    }

    fn set_slot(&mut self, slot: usize, v: [u8; SLOT_BYTES]) {
        self.data[slot * SLOT_BYTES..(slot + 1) * SLOT_BYTES].copy_from_slice(&v);
    }
}

fn split_id(id: u16) -> (u16, usize) {
    (id / SLOTS_PER_BLOCK as u16, usize::from(id) % SLOTS_PER_BLOCK)
}

/// Write-through cache of parameter blocks.
pub struct ParamCache<B: BlockStore> {
    store: B,
    blocks: BTreeMap<u16, Block>,
}

impl<B: BlockStore> ParamCache<B> {
    pub fn new(store: B) -> Self {
        Self {
            store,
            blocks: BTreeMap::new(),
        }
    }

    pub fn into_inner(self) -> B {
        self.store
    }

    /// Drop cached copies so the next access re-reads the backend.
    pub fn invalidate(&mut self) {
        self.blocks.clear();
    }

    fn load(&mut self, block: u16) -> Result<&Block, StorageError> {
        if !self.blocks.contains_key(&block) {
            let bytes = self
                .store
                .read_block(block)
                .map_err(|e| map_store_error(block, &*e, false))?;
            let parsed = Block::parse(block, &bytes).inspect_err(|e| {
                tracing::warn!(block, error = %e, "parameter block rejected");
            })?;
            self.blocks.insert(block, parsed);
        }
        self.blocks
            .get(&block)
            .ok_or_else(|| StorageError::Read {
                block,
                reason: "block vanished from cache".into(),
            })
    }

    pub fn get(&mut self, id: u16) -> Result<[u8; SLOT_BYTES], StorageError> {
        let (block, slot) = split_id(id);
        Ok(self.load(block)?.slot(slot))
    }

    pub fn get_f64(&mut self, id: u16) -> Result<f64, StorageError> {
        self.get(id).map(decode_f64)
    }

    pub fn get_i32(&mut self, id: u16) -> Result<i32, StorageError> {
        self.get(id).map(decode_i32)
    }

    pub fn set(&mut self, id: u16, value: [u8; SLOT_BYTES]) -> Result<(), StorageError> {
        self.set_many(&[(id, value)])
    }

    pub fn set_f64(&mut self, id: u16, v: f64) -> Result<(), StorageError> {
        self.set(id, encode_f64(v))
    }

    pub fn set_i32(&mut self, id: u16, v: i32) -> Result<(), StorageError> {
        self.set(id, encode_i32(v))
    }

    /// Update several slots, writing each touched block once.
    ///
    /// Blocks are written in ascending order; a block whose write fails keeps its
    /// previous cached contents.
    pub fn set_many(&mut self, values: &[(u16, [u8; SLOT_BYTES])]) -> Result<(), StorageError> {
        let mut staged: BTreeMap<u16, Block> = BTreeMap::new();
        for &(id, v) in values {
            let (block, slot) = split_id(id);
            if !staged.contains_key(&block) {
                let current = self.load(block)?.clone();
                staged.insert(block, current);
            }
            if let Some(b) = staged.get_mut(&block) {
                b.set_slot(slot, v);
            }
        }
        for (block, b) in staged {
            self.store
                .write_block(block, &b.to_bytes())
                .map_err(|e| {
                    let err = map_store_error(block, &*e, true);
                    tracing::warn!(block, error = %err, "parameter block write failed");
                    err
                })?;
            self.blocks.insert(block, b);
        }
        Ok(())
    }

    /// Persist zero, test points and geo codes.
    pub fn save_calibration(&mut self, cal: &CalibrationPoints) -> Result<(), StorageError> {
        let mut values = vec![
            (ids::CAL_VALID, encode_i32(VALID_MARK)),
            (ids::CAL_ZERO, encode_f64(cal.zero_counts())),
            (ids::CAL_GEO, encode_i32(i32::from(cal.cal_geo()))),
            (ids::USR_GEO, encode_i32(i32::from(cal.usr_geo()))),
            (
                ids::CAL_POINTS_IN_USE,
                encode_i32(i32::from(cal.upscale_test_points())),
            ),
        ];
        for i in 0..MAX_TEST_POINTS {
            let p = cal.point(i as u8 + 1);
            let off = i as u16;
            values.push((ids::CAL_COUNTS + off, encode_f64(p.map_or(0.0, |p| p.counts))));
            values.push((ids::CAL_LOADS + off, encode_f64(p.map_or(0.0, |p| p.weight))));
        }
        self.set_many(&values)?;
        tracing::info!(zero = cal.zero_counts(), "calibration saved");
        Ok(())
    }

    /// Load a persisted calibration; `Ok(None)` when the block was never written.
    pub fn load_calibration(&mut self) -> Result<Option<CalibrationPoints>, StorageError> {
        if self.get_i32(ids::CAL_VALID)? != VALID_MARK {
            return Ok(None);
        }
        let zero_counts = self.get_f64(ids::CAL_ZERO)?;
        let in_use = u8::try_from(self.get_i32(ids::CAL_POINTS_IN_USE)?).unwrap_or(1);
        let mut cal = CalibrationPoints::new(zero_counts, MAX_TEST_POINTS as u8);
        cal.set_usr_geo(u8::try_from(self.get_i32(ids::USR_GEO)?).unwrap_or(16));
        let mut zero = ZeroState::new(zero_counts);
        for i in 0..MAX_TEST_POINTS {
            let off = i as u16;
            let load = self.get_f64(ids::CAL_LOADS + off)?;
            if load > 0.0 {
                let counts = self.get_f64(ids::CAL_COUNTS + off)?;
                cal.adjust_calibration(i as u8 + 1, load, counts, &mut zero)
                    .map_err(|e: CalibrationError| StorageError::Read {
                        block: ids::CAL_VALID / SLOTS_PER_BLOCK as u16,
                        reason: e.to_string(),
                    })?;
            }
        }
        cal.set_upscale_test_points(in_use);
        cal.set_cal_geo(u8::try_from(self.get_i32(ids::CAL_GEO)?).unwrap_or(16));
        Ok(Some(cal))
    }

    /// Persist capacity, increment, ranges, units and the low-pass request.
    pub fn save_scale(&mut self, params: &ScaleParams, filter: &FilterCfg) -> Result<(), StorageError> {
        let u = params.units();
        let values = [
            (ids::SCALE_VALID, encode_i32(VALID_MARK)),
            (ids::CAPACITY, encode_f64(params.capacity())),
            (ids::INCREMENT, encode_f64(params.increment())),
            (ids::RANGES, encode_i32(i32::from(params.ranges()))),
            (
                ids::TRADE_MODE,
                encode_i32(match params.trade_mode() {
                    TradeMode::Industrial => 0,
                    TradeMode::LegalForTrade => 1,
                }),
            ),
            (ids::CAL_UNIT, encode_i32(u.calibration.code())),
            (ids::PRIMARY_UNIT, encode_i32(u.primary.code())),
            (ids::SECONDARY_UNIT, encode_i32(u.secondary.code())),
            (ids::CUSTOM_GRAMS, encode_f64(u.custom_grams.unwrap_or(0.0))),
            (ids::OVER_CAPACITY_INC, encode_f64(params.over_capacity_inc())),
            (ids::FILTER_CUTOFF_HZ, encode_f64(filter.cutoff_hz)),
            (ids::FILTER_POLES, encode_i32(i32::from(filter.poles))),
        ];
        self.set_many(&values)
    }

    /// Load scale parameters and filter request; `Ok(None)` when never written.
    pub fn load_scale(&mut self) -> Result<Option<(ScaleParams, FilterCfg)>, StorageError> {
        if self.get_i32(ids::SCALE_VALID)? != VALID_MARK {
            return Ok(None);
        }
        let unit = |code: i32| Unit::from_code(code).unwrap_or(Unit::Kilogram);
        let custom = self.get_f64(ids::CUSTOM_GRAMS)?;
        let units = UnitSet {
            calibration: unit(self.get_i32(ids::CAL_UNIT)?),
            primary: unit(self.get_i32(ids::PRIMARY_UNIT)?),
            secondary: unit(self.get_i32(ids::SECONDARY_UNIT)?),
            custom_grams: (custom > 0.0).then_some(custom),
        };
        let trade_mode = if self.get_i32(ids::TRADE_MODE)? == 1 {
            TradeMode::LegalForTrade
        } else {
            TradeMode::Industrial
        };
        let params = ScaleParams::new(
            self.get_f64(ids::CAPACITY)?,
            self.get_f64(ids::INCREMENT)?,
            u8::try_from(self.get_i32(ids::RANGES)?).unwrap_or(1),
            trade_mode,
            units,
            self.get_f64(ids::OVER_CAPACITY_INC)?,
        )
        .map_err(|e| StorageError::Read {
            block: ids::SCALE_VALID / SLOTS_PER_BLOCK as u16,
            reason: e.to_string(),
        })?;
        let filter = FilterCfg {
            cutoff_hz: self.get_f64(ids::FILTER_CUTOFF_HZ)?,
            poles: u8::try_from(self.get_i32(ids::FILTER_POLES)?).unwrap_or(4),
        };
        Ok(Some((params, filter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use weigh_traits::BoxError;

    #[derive(Default)]
    struct MapStore {
        blocks: HashMap<u16, Vec<u8>>,
        fail_writes: bool,
        writes: usize,
    }

    impl BlockStore for MapStore {
        fn read_block(&mut self, block: u16) -> Result<Vec<u8>, BoxError> {
            Ok(self
                .blocks
                .get(&block)
                .cloned()
                .unwrap_or_else(|| vec![0; BLOCK_BYTES]))
        }
        fn write_block(&mut self, block: u16, bytes: &[u8]) -> Result<(), BoxError> {
            if self.fail_writes {
                return Err("eeprom busy".into());
            }
            self.writes += 1;
            self.blocks.insert(block, bytes.to_vec());
            Ok(())
        }
    }

    #[test]
    fn codecs_are_little_endian() {
        assert_eq!(encode_i32(0x0102_0304), [4, 3, 2, 1, 0, 0, 0, 0]);
        assert_eq!(encode_f64(1.0), [0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
        assert_eq!(decode_i32(encode_i32(-7)), -7);
    }

    #[test]
    fn checksum_wraps() {
        let data = vec![0xFF; 300];
        assert_eq!(checksum(&data), (300u32 * 0xFF % 65_536) as u16);
    }

    #[test]
    fn blank_store_reads_as_zero() {
        let mut c = ParamCache::new(MapStore::default());
        assert_eq!(c.get_f64(150).unwrap(), 0.0);
        assert!(c.load_calibration().unwrap().is_none());
    }

    #[test]
    fn set_writes_block_with_checksum() {
        let mut c = ParamCache::new(MapStore::default());
        c.set_i32(205, 3).unwrap();
        let store = c.into_inner();
        let bytes = &store.blocks[&2];
        assert_eq!(bytes.len(), BLOCK_BYTES);
        assert_eq!(bytes[5 * SLOT_BYTES], 3);
        assert_eq!(u16::from_le_bytes([bytes[800], bytes[801]]), 3);
    }

    #[test]
    fn corrupted_block_is_rejected() {
        let mut store = MapStore::default();
        let mut bytes = vec![0u8; BLOCK_BYTES];
        bytes[10] = 9;
        store.blocks.insert(1, bytes);
        let mut c = ParamCache::new(store);
        assert!(matches!(
            c.get(110),
            Err(StorageError::Checksum { block: 1, stored: 0, computed: 9 })
        ));
    }

    #[test]
    fn failed_write_keeps_cache() {
        let mut c = ParamCache::new(MapStore::default());
        c.set_f64(201, 42.0).unwrap();
        c.store.fail_writes = true;
        let err = c.set_f64(201, 7.0).unwrap_err();
        assert!(matches!(err, StorageError::Write { block: 2, .. }));
        assert_eq!(c.get_f64(201).unwrap(), 42.0);
    }

    #[test]
    fn set_many_writes_each_block_once() {
        let mut c = ParamCache::new(MapStore::default());
        c.set_many(&[
            (101, encode_f64(1.0)),
            (102, encode_f64(2.0)),
            (201, encode_f64(3.0)),
        ])
        .unwrap();
        assert_eq!(c.store.writes, 2);
    }

    #[test]
    fn calibration_survives_a_reload() {
        let cal = CalibrationPoints::from_points(
            1_000.0,
            &[(5_000.0, 50.0), (9_000.0, 100.0)],
            12,
            14,
        )
        .unwrap();
        let mut c = ParamCache::new(MapStore::default());
        c.save_calibration(&cal).unwrap();
        let mut fresh = ParamCache::new(c.into_inner());
        let loaded = fresh.load_calibration().unwrap().unwrap();
        assert_eq!(loaded, cal);
    }

    #[test]
    fn scale_params_survive_a_reload() {
        let params = ScaleParams::new(30.0, 0.005, 3, TradeMode::LegalForTrade, UnitSet::default(), 9.0)
            .unwrap();
        let filter = FilterCfg {
            cutoff_hz: 1.5,
            poles: 6,
        };
        let mut c = ParamCache::new(MapStore::default());
        c.save_scale(&params, &filter).unwrap();
        let mut fresh = ParamCache::new(c.into_inner());
        let (p, f) = fresh.load_scale().unwrap().unwrap();
        assert_eq!(p, params);
        assert_eq!(f, filter);
    }
}
