#![no_std]

extern crate alloc;

/* sfs 的整体架构，自上而下 */

// 文件系统层：格式化、挂载以及面向系统调用的接口
mod fs;
mod file;

// 路径解析层：逐级遍历以`/`分隔的路径
mod path;

// 目录层：把 inode 的字节流解释为目录项序列
mod directory;

// 索引节点层：内存中共享、引用计数的 inode
mod inode;

// 空闲扇区位图：持久化的扇区分配器
mod free_map;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 扇区缓冲：以扇区为单位读写块设备
mod sector;

mod error;

pub use block_dev::{BlockDevice, IoError};

pub use self::{
    directory::Directory,
    error::{Error, Result},
    file::{File, OpenFlag},
    free_map::FreeMap,
    fs::FileSystem,
    inode::{Inode, InodeKind},
    layout::{DIRECT_COUNT, INDIRECT_COUNT, MAX_FILE_SECTORS},
    path::{resolve, Path},
    sector::SectorId,
};

pub const MAGIC: u32 = 0x494e4f44;
pub const SECTOR_SIZE: usize = 512;
/// 文件名的最大长度（不含结尾的`\0`）
pub const NAME_MAX: usize = 14;

/// 空闲扇区位图文件的 inode 所在扇区
pub const FREE_MAP_SECTOR: SectorId = SectorId::new(0);
/// 根目录的 inode 所在扇区
pub const ROOT_DIR_SECTOR: SectorId = SectorId::new(1);
