//! # 磁盘数据结构层
//!
//! sfs 的磁盘布局：
//! 扇区0为空闲扇区位图文件的 inode | 扇区1为根目录的 inode | 其余扇区按需分配
//!
//! 位图文件与目录都是普通的 inode 字节流。

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DIRECT_COUNT, DiskInode, INDIRECT_COUNT, InodeKind, MAX_FILE_SECTORS};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;
