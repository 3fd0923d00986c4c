#![deny(missing_docs)]

//! Hash table storage engine for fixed width keys and values.
//!
//! Tables are mounted onto caller supplied memory (a Vec, a slice or a memory mapped file) and
//! never allocate their bucket storage themselves.  Two table kinds are provided: a dense
//! linear probing table and a blocked cuckoo table that places keys with a breadth first
//! eviction search.  Buckets fold the empty/deleted state into either the key or the value, and
//! a wrapper adds two reserved buckets so the sentinel keys can still be stored.
//!
//! Table images can be dumped with a CRC32 protected header (See
//! https://github.com/srijs/rust-crc32fast), read back through file iterators or memory mapped
//! and mounted read only.
//!
//! The pack and attribute modules encode records of fixed and variable length fields into one
//! byte buffer, the form values usually take before their key is indexed.

pub mod attribute;
pub mod bucket;
pub(crate) mod crc;
pub mod error;
pub mod hash;
pub mod iter;
pub mod pack;
pub mod table;
pub mod table_bytes;
pub mod table_config;
pub mod table_files;
pub mod table_key;
pub mod value;
