//! # 块设备接口层
//!
//! 块设备是以**块**（扇区）为单位存储数据的设备，例如磁盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 每次读写都是同步的，且对单个块而言是原子的。

#![no_std]

use core::any::Any;
use core::fmt;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 读出编号为`block_id`的整块，`buf`的长度恰为块大小。
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), IoError>;

    /// 写入编号为`block_id`的整块，`buf`的长度恰为块大小。
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), IoError>;

    /// 设备的总块数
    fn num_blocks(&self) -> usize;
}

/// 读写某块失败。失败只报告一次，不会重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoError {
    pub block_id: usize,
}

impl IoError {
    #[inline]
    pub const fn new(block_id: usize) -> Self {
        Self { block_id }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I/O error on block {}", self.block_id)
    }
}

impl core::error::Error for IoError {}
