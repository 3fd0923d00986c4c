//! Configuration for a sharded table.

use kvtable_core::table_config::TableConfig;

/// Most shard bits allowed (256 shards).
pub const MAX_SHARD_BITS: u8 = 8;

/// Configuration for a ShardedTable.
#[derive(Clone, Debug)]
pub struct ShardedConfig {
    pub(crate) shard_bits: u8,
    pub(crate) initial_capacity: u64,
    pub(crate) channel_depth: usize,
    pub(crate) table_config: TableConfig,
}

impl Default for ShardedConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedConfig {
    /// Create a new config with the defaults.
    pub fn new() -> Self {
        Self {
            shard_bits: 3,
            initial_capacity: 1024,
            channel_depth: 10_000,
            table_config: TableConfig::new(),
        }
    }

    /// The table is split into 2^shard_bits shards (clamped to MAX_SHARD_BITS).
    pub fn set_shard_bits(mut self, shard_bits: u8) -> Self {
        self.shard_bits = shard_bits.min(MAX_SHARD_BITS);
        self
    }

    /// Keys each shard can hold before it has to grow.
    pub fn set_initial_capacity(mut self, initial_capacity: u64) -> Self {
        self.initial_capacity = initial_capacity.max(1);
        self
    }

    /// Commands that can queue for a shard's write thread before writers wait.
    pub fn set_channel_depth(mut self, channel_depth: usize) -> Self {
        self.channel_depth = channel_depth.max(1);
        self
    }

    /// Config used to mount every shard table.
    pub fn set_table_config(mut self, table_config: TableConfig) -> Self {
        self.table_config = table_config;
        self
    }

    /// Number of shards.
    pub fn shards(&self) -> usize {
        1 << self.shard_bits
    }

    /// Config used to mount every shard table.
    pub fn table_config(&self) -> &TableConfig {
        &self.table_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ShardedConfig::new();
        assert_eq!(config.shards(), 8);
        let config = config
            .set_shard_bits(12)
            .set_initial_capacity(0)
            .set_channel_depth(16);
        assert_eq!(config.shards(), 256);
        assert_eq!(config.initial_capacity, 1);
        assert_eq!(config.channel_depth, 16);
        let config = config.set_shard_bits(0);
        assert_eq!(config.shards(), 1);
    }
}
