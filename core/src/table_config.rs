//! Define the configuration used to mount a hash table onto a memory region.

use crate::error::MountError;

/// Default occupancy for cuckoo tables.
pub const DEFAULT_CUCKOO_OCCUPANCY_PCT: u8 = 80;
/// Default occupancy for dense (linear probing) tables.
pub const DEFAULT_DENSE_OCCUPANCY_PCT: u8 = 50;
/// Most hash functions a cuckoo table will ever use.
pub const MAX_HASH_FUNCTIONS: u8 = 32;

/// Configuration for a table.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub(crate) occupancy_pct: Option<u8>,
    pub(crate) init_nu_hash_func: u8,
    pub(crate) max_nu_hash_func: u8,
    pub(crate) bfs_depth: u32,
    pub(crate) stretch: bool,
    pub(crate) special_key: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TableConfig {
    /// Create a new config with the defaults.
    pub fn new() -> Self {
        Self {
            occupancy_pct: None,
            init_nu_hash_func: 2,
            max_nu_hash_func: 8,
            bfs_depth: 100,
            stretch: true,
            special_key: false,
        }
    }

    /// Target load factor in percent (1-100).  Capacity is bucket_count * pct / 100.
    pub fn set_occupancy_pct(mut self, occupancy_pct: u8) -> Self {
        self.occupancy_pct = Some(occupancy_pct);
        self
    }

    /// Hash functions a fresh cuckoo table starts with.
    pub fn set_init_nu_hash_func(mut self, nu_hash_func: u8) -> Self {
        self.init_nu_hash_func = nu_hash_func;
        self
    }

    /// Hash functions a cuckoo table may grow to before inserts fail.
    pub fn set_max_nu_hash_func(mut self, max_nu_hash_func: u8) -> Self {
        self.max_nu_hash_func = max_nu_hash_func;
        self
    }

    /// Depth limit of the cuckoo eviction search.
    pub fn set_bfs_depth(mut self, bfs_depth: u32) -> Self {
        self.bfs_depth = bfs_depth;
        self
    }

    /// Do NOT reserve memory for a later stretch().
    pub fn no_stretch(mut self) -> Self {
        self.stretch = false;
        self
    }

    /// Reserve two buckets past the table for the sentinel keys (see SpecialKeyTable).
    pub fn special_key(mut self) -> Self {
        self.special_key = true;
        self
    }

    /// Occupancy to use, default_pct if not set.
    pub fn occupancy_or(&self, default_pct: u8) -> u8 {
        self.occupancy_pct.unwrap_or(default_pct)
    }

    pub(crate) fn validate(&self, default_pct: u8) -> Result<(), MountError> {
        let occupancy_pct = self.occupancy_or(default_pct);
        if occupancy_pct == 0 || occupancy_pct > 100 {
            return Err(MountError::InvalidConfig("occupancy_pct must be 1-100"));
        }
        if self.init_nu_hash_func == 0 || self.init_nu_hash_func > self.max_nu_hash_func {
            return Err(MountError::InvalidConfig(
                "init_nu_hash_func must be 1..=max_nu_hash_func",
            ));
        }
        if self.max_nu_hash_func > MAX_HASH_FUNCTIONS {
            return Err(MountError::InvalidConfig("too many hash functions"));
        }
        if self.bfs_depth == 0 {
            return Err(MountError::InvalidConfig("bfs_depth must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = TableConfig::new()
            .set_occupancy_pct(90)
            .set_max_nu_hash_func(4)
            .no_stretch()
            .special_key();
        assert_eq!(config.occupancy_or(DEFAULT_CUCKOO_OCCUPANCY_PCT), 90);
        assert!(!config.stretch);
        assert!(config.special_key);
        assert!(config.validate(80).is_ok());
        assert_eq!(TableConfig::new().occupancy_or(DEFAULT_DENSE_OCCUPANCY_PCT), 50);
    }

    #[test]
    fn test_validate() {
        assert!(TableConfig::new().set_occupancy_pct(0).validate(80).is_err());
        assert!(TableConfig::new().set_occupancy_pct(101).validate(80).is_err());
        assert!(TableConfig::new()
            .set_init_nu_hash_func(9)
            .validate(80)
            .is_err());
        assert!(TableConfig::new()
            .set_max_nu_hash_func(40)
            .validate(80)
            .is_err());
    }
}
