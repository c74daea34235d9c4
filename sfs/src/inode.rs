//! # 索引节点层
//!
//! 内存中的 [`Inode`] 是对某个 inode 扇区的共享句柄：
//! 同一扇区在内存中至多有一份，由文件系统的登记表按扇区号索引。
//! 克隆句柄即再次打开，最后一个句柄释放时关闭；
//! 若此时已被标记删除，则归还它占据的全部扇区。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::RwLock;

use crate::FileSystem;
use crate::layout::DiskInode;
use crate::{Error, Result, SectorId};

pub use crate::layout::InodeKind;

#[derive(Clone)]
pub struct Inode(Arc<InodeInner>);

pub(crate) struct InodeInner {
    /// inode所在扇区
    sector: SectorId,
    fs: Arc<FileSystem>,
    /// 目录项已被删除，但仍有句柄打开
    removed: AtomicBool,
    /// 非零时拒绝写入
    deny_write: AtomicUsize,
    /// 磁盘 inode 的副本，兼作内容读写锁
    disk_inode: RwLock<DiskInode>,
}

impl Inode {
    /// 在`sector`上建立长度为`size`字节的 inode。
    ///
    /// 空间不足时不留下任何已分配的数据块。
    pub fn create(
        fs: &FileSystem,
        sector: SectorId,
        size: usize,
        kind: InodeKind,
        parent: SectorId,
    ) -> Result<()> {
        let mut disk_inode = DiskInode::new(kind, parent);
        disk_inode.extend(
            size,
            &fs.block_device,
            &mut fs.free_map.lock(),
            |disk_inode| disk_inode.store(sector, &fs.block_device),
        )?;

        log::debug!("create {kind:?} inode at sector {sector} with {size} bytes");
        Ok(())
    }

    /// 打开`sector`上的 inode；已打开时返回共享的句柄
    pub fn open(fs: &Arc<FileSystem>, sector: SectorId) -> Result<Self> {
        let mut open_inodes = fs.open_inodes.lock();
        if let Some(inner) = open_inodes.get(&sector).and_then(|inode| inode.upgrade()) {
            return Ok(Self(inner));
        }

        let disk_inode = DiskInode::load(sector, &fs.block_device)?;
        let inner = Arc::new(InodeInner {
            sector,
            fs: fs.clone(),
            removed: AtomicBool::new(false),
            deny_write: AtomicUsize::new(0),
            disk_inode: RwLock::new(disk_inode),
        });
        open_inodes.insert(sector, Arc::downgrade(&inner));

        Ok(Self(inner))
    }

    /// inode 所在扇区，也是它的编号
    #[inline]
    pub fn sector(&self) -> SectorId {
        self.0.sector
    }

    /// 当前打开的句柄数
    #[inline]
    pub fn open_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    #[inline]
    pub fn kind(&self) -> InodeKind {
        self.0.disk_inode.read().kind()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == InodeKind::Directory
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.disk_inode.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 所在目录
    #[inline]
    pub fn parent(&self) -> SectorId {
        self.0.disk_inode.read().parent.into()
    }

    /// 目录下正在使用的目录项数
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.0.disk_inode.read().entry_count as usize
    }

    /// 占据的扇区总数：inode 自身、数据块与索引块
    pub fn total_sectors(&self) -> usize {
        1 + self.0.disk_inode.read().total_sectors()
    }

    /// 标记删除，最后一个句柄关闭时才真正归还扇区
    #[inline]
    pub fn remove(&self) {
        self.0.removed.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.0.removed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn deny_write(&self) {
        self.0.deny_write.fetch_add(1, Ordering::AcqRel);
    }

    pub fn allow_write(&self) {
        let result = self
            .0
            .deny_write
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));
        if result.is_err() {
            log::warn!("allow_write on inode {} without deny_write", self.sector());
        }
    }

    #[inline]
    pub fn writes_denied(&self) -> bool {
        self.0.deny_write.load(Ordering::Acquire) > 0
    }

    pub fn byte_to_sector(&self, offset: usize) -> Result<SectorId> {
        self.0
            .disk_inode
            .read()
            .byte_to_sector(offset, &self.0.fs.block_device)
    }

    /// 把长度增加`additional`字节，新增部分读出全为0
    pub fn extend(&self, additional: usize) -> Result<()> {
        self.0.extend(&mut self.0.disk_inode.write(), additional)
    }

    /// 从`offset`开始读，越过末尾时读到的字节数会变少
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.0
            .disk_inode
            .read()
            .read_at(offset, buf, &self.0.fs.block_device)
    }

    /// 从`offset`开始写，必要时先扩展文件
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let fs = &self.0.fs;
        let mut disk_inode = self.0.disk_inode.write();
        let end = offset.checked_add(buf.len()).ok_or(Error::NoSpace)?;
        if end > disk_inode.len() {
            let additional = end - disk_inode.len();
            self.0.extend(&mut disk_inode, additional)?;
        }

        disk_inode.write_at(offset, buf, &fs.block_device)
    }

    #[inline]
    pub(crate) fn fs(&self) -> &Arc<FileSystem> {
        &self.0.fs
    }

    /// 修改磁盘 inode 并立即写回；写回失败时内存中的副本保持不变
    pub(crate) fn update<V>(&self, f: impl FnOnce(&mut DiskInode) -> V) -> Result<V> {
        let mut disk_inode = self.0.disk_inode.write();
        let mut modified = disk_inode.clone();
        let value = f(&mut modified);
        modified.store(self.0.sector, &self.0.fs.block_device)?;
        *disk_inode = modified;
        Ok(value)
    }
}

impl InodeInner {
    /// 扩展并写回，写回失败时连同分配一起撤销
    fn extend(&self, disk_inode: &mut DiskInode, additional: usize) -> Result<()> {
        disk_inode.extend(
            additional,
            &self.fs.block_device,
            &mut self.fs.free_map.lock(),
            |disk_inode| disk_inode.store(self.sector, &self.fs.block_device),
        )
    }

    fn release(&mut self) -> Result<()> {
        let disk_inode = self.disk_inode.get_mut();
        let mut free_map = self.fs.free_map.lock();
        disk_inode.release(&self.fs.block_device, &mut free_map)?;
        free_map.release(self.sector, 1)?;

        log::debug!(
            "release inode {} with {} data sectors",
            self.sector,
            disk_inode.num_sectors()
        );
        Ok(())
    }
}

impl Drop for InodeInner {
    fn drop(&mut self) {
        {
            let mut open_inodes = self.fs.open_inodes.lock();
            // 期间可能已有人重新打开了同一扇区
            if open_inodes
                .get(&self.sector)
                .is_some_and(|inode| inode.strong_count() == 0)
            {
                open_inodes.remove(&self.sector);
            }
        }

        if *self.removed.get_mut() {
            if let Err(err) = self.release() {
                log::error!("failed to release inode {}: {err}", self.sector);
            }
        }
    }
}
