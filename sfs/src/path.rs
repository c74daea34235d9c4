//! # 路径解析层

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::sync::Arc;

use crate::{Directory, Error, FileSystem, Inode, NAME_MAX, ROOT_DIR_SECTOR, Result, SectorId};

pub trait Path {
    fn is_absolute(&self) -> bool;

    /// 以`/`分隔的各个非空分量，连续的`/`视为一个
    fn components(&self) -> impl Iterator<Item = &Self>;

    fn is_relative(&self) -> bool {
        !self.is_absolute()
    }
}

impl Path for str {
    #[inline]
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    #[inline]
    fn components(&self) -> impl Iterator<Item = &Self> {
        self.split('/').filter(|cmp| !cmp.is_empty())
    }
}

/// 把路径解析为`(最后一个分量所在的目录, 最后一个分量)`。
///
/// 绝对路径从根目录出发，相对路径从`cwd`出发；
/// 除最后一个分量外，其余分量都必须是已存在的目录。
/// 没有任何分量（如`/`）时返回出发目录与`.`。
pub fn resolve(fs: &Arc<FileSystem>, path: &str, cwd: SectorId) -> Result<(Directory, String)> {
    if path.is_empty() {
        return Err(Error::NotFound);
    }

    let origin = if path.is_absolute() {
        ROOT_DIR_SECTOR
    } else {
        cwd
    };
    let mut dir = Directory::open(Inode::open(fs, origin)?)?;

    let mut cmps = path.components();
    let Some(mut name) = cmps.next() else {
        return Ok((dir, ".".to_owned()));
    };

    for next in cmps {
        check_len(name)?;
        let inode = dir.lookup(name)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        dir = Directory::open(inode)?;
        name = next;
    }
    check_len(name)?;

    Ok((dir, name.to_owned()))
}

#[inline]
fn check_len(cmp: &str) -> Result<()> {
    if cmp.len() > NAME_MAX {
        return Err(Error::NameTooLong);
    }
    Ok(())
}
