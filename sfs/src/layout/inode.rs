//! 磁盘上的 inode 与多级索引
//!
//! - 直接索引：inode 内连续存储[`DIRECT_COUNT`]个**块编号**，每个编号指向一个数据块
//! - 一级索引：整个块连续存储**块编号**，每个编号都指向一个数据块
//! - 二级索引：整个块连续存储**块编号**，每个编号都指向一个一级索引块
//!
//! 目录的空间用于存放目录项；文件的空间用于存放它的数据。
//!
//! ## 块索引编码
//!
//! 三层的地址空间首尾相接，边界分别为
//! `DIRECT_COUNT`、`DIRECT_COUNT + INDIRECT_COUNT`
//! 与`DIRECT_COUNT + INDIRECT_COUNT + INDIRECT_COUNT²`，
//! 每一层所需的块数都直接由这三个边界算出。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;

use crate::free_map::FreeMap;
use crate::sector::{OnDisk, Sector};
use crate::{Error, MAGIC, Result, SECTOR_SIZE, SectorId};

/// 直接索引的编号数量
pub const DIRECT_COUNT: usize = 119;
/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 用上一级索引时的编号容量
const INDIRECT_CAP: usize = DIRECT_COUNT + INDIRECT_COUNT;
/// 用上二级索引时的编号容量
const DOUBLY_INDIRECT_CAP: usize = INDIRECT_CAP + INDIRECT_COUNT * INDIRECT_COUNT;
/// 单个 inode 最多拥有的数据块数
pub const MAX_FILE_SECTORS: usize = DOUBLY_INDIRECT_CAP;

/// 间接索引块
type IndexBlock = [u32; INDIRECT_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
}

/// 磁盘上的 inode，恰好占据一个扇区
#[derive(Debug, Clone)]
#[repr(C)]
pub struct DiskInode {
    /// 字节长度
    length: u64,
    /// 已分配的数据块数，不含索引块
    num_sectors: u32,
    is_directory: u8,
    _pad: [u8; 3],
    /// 目录下正在使用的目录项数，仅对目录有效
    pub entry_count: u32,
    /// 所在目录的 inode 扇区
    pub parent: u32,
    direct: [u32; DIRECT_COUNT],
    /// 指向一个一级索引块
    indirect: u32,
    /// 指向一个二级索引块
    doubly_indirect: u32,
    magic: u32,
}

unsafe impl OnDisk for DiskInode {}

const _: () = assert!(core::mem::size_of::<DiskInode>() == SECTOR_SIZE);

/// 数据块的逻辑索引在三层地址空间中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockPos {
    Direct(usize),
    Indirect(usize),
    DoublyIndirect { outer: usize, inner: usize },
}

impl BlockPos {
    /// 超出最大容量时返回`None`
    fn locate(index: usize) -> Option<Self> {
        if index < DIRECT_COUNT {
            Some(Self::Direct(index))
        } else if index < INDIRECT_CAP {
            Some(Self::Indirect(index - DIRECT_COUNT))
        } else if index < DOUBLY_INDIRECT_CAP {
            let index = index - INDIRECT_CAP;
            Some(Self::DoublyIndirect {
                outer: index / INDIRECT_COUNT,
                inner: index % INDIRECT_COUNT,
            })
        } else {
            None
        }
    }
}

impl DiskInode {
    pub fn new(kind: InodeKind, parent: SectorId) -> Self {
        Self {
            length: 0,
            num_sectors: 0,
            is_directory: (kind == InodeKind::Directory) as u8,
            _pad: [0; 3],
            entry_count: 0,
            parent: parent.into(),
            direct: [0; DIRECT_COUNT],
            indirect: 0,
            doubly_indirect: 0,
            magic: MAGIC,
        }
    }

    /// 读出`sector`上的 inode，魔数不符即视为结构损坏
    pub fn load(sector: SectorId, block_device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let disk_inode = Sector::read(sector, block_device)?.map(0, Self::clone);
        if !disk_inode.is_valid() {
            log::error!("bad inode magic {:#x} at sector {sector}", disk_inode.magic);
            return Err(Error::StructureCorrupt(sector));
        }
        Ok(disk_inode)
    }

    pub fn store(&self, sector: SectorId, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        let mut buf = Sector::zeroed(sector);
        *buf.get_mut::<Self>(0) = self.clone();
        buf.write(block_device)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    #[inline]
    pub fn kind(&self) -> InodeKind {
        if self.is_directory != 0 {
            InodeKind::Directory
        } else {
            InodeKind::File
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == InodeKind::Directory
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline]
    pub fn num_sectors(&self) -> usize {
        self.num_sectors as usize
    }

    /// 数据块与索引块的总数
    #[inline]
    pub fn total_sectors(&self) -> usize {
        self.num_sectors() + Self::count_index_sectors(self.num_sectors())
    }

    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 返回其扇区号；尚未分配时返回空。
    pub fn data_sector(
        &self,
        index: usize,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<Option<SectorId>> {
        if index >= self.num_sectors() {
            return Ok(None);
        }

        let raw = match BlockPos::locate(index) {
            Some(BlockPos::Direct(i)) => self.direct[i],
            Some(BlockPos::Indirect(i)) => Sector::read(self.indirect.into(), block_device)?
                .map(0, |indirect: &IndexBlock| indirect[i]),
            Some(BlockPos::DoublyIndirect { outer, inner }) => {
                let indirect = Sector::read(self.doubly_indirect.into(), block_device)?
                    .map(0, |doubly: &IndexBlock| doubly[outer]);
                Sector::read(indirect.into(), block_device)?
                    .map(0, |indirect: &IndexBlock| indirect[inner])
            }
            None => return Ok(None),
        };

        Ok(Some(raw.into()))
    }

    /// 字节偏移所在的扇区，偏移须小于当前长度
    pub fn byte_to_sector(
        &self,
        offset: usize,
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<SectorId> {
        if offset >= self.len() {
            return Err(Error::OutOfRange);
        }
        self.data_sector(offset / SECTOR_SIZE, block_device)?
            .ok_or(Error::OutOfRange)
    }

    /// 把长度增加`additional`字节，随后以`commit`持久化扩展后的 inode。
    ///
    /// 先检查空闲扇区是否足够，不够则什么也不分配；
    /// 分配或`commit`失败时恢复原状并归还本次分配的全部扇区。
    pub fn extend(
        &mut self,
        additional: usize,
        block_device: &Arc<dyn BlockDevice>,
        free_map: &mut FreeMap,
        commit: impl FnOnce(&Self) -> Result<()>,
    ) -> Result<()> {
        if additional == 0 {
            return commit(self);
        }

        let new_len = self.len().checked_add(additional).ok_or(Error::NoSpace)?;
        let have = self.num_sectors();
        let want = new_len.div_ceil(SECTOR_SIZE).max(have);
        if want > MAX_FILE_SECTORS {
            log::warn!("{new_len} bytes exceed the largest file");
            return Err(Error::NoSpace);
        }

        let needed =
            want - have + Self::count_index_sectors(want) - Self::count_index_sectors(have);
        if !free_map.available(needed) {
            log::debug!("extend needs {needed} sectors, {} free", free_map.free_count());
            return Err(Error::NoSpace);
        }

        let snapshot = self.clone();
        let mut fresh = Vec::with_capacity(needed);
        let result = self.grow(want, block_device, free_map, &mut fresh).and_then(|()| {
            self.length = new_len as u64;
            commit(self)
        });
        match result {
            Ok(()) => {
                log::debug!("extend to {new_len} bytes with {} new sectors", fresh.len());
                Ok(())
            }
            Err(err) => {
                *self = snapshot;
                for &sector in fresh.iter().rev() {
                    if let Err(err) = free_map.release(sector, 1) {
                        log::error!("failed to roll back sector {sector}: {err}");
                    }
                }
                Err(err)
            }
        }
    }

    /// 依次填充直接索引、一级索引、二级索引，直到拥有`want`个数据块
    fn grow(
        &mut self,
        want: usize,
        block_device: &Arc<dyn BlockDevice>,
        free_map: &mut FreeMap,
        fresh: &mut Vec<SectorId>,
    ) -> Result<()> {
        let mut next = self.num_sectors();

        /******************** 直接索引 ********************/
        while next < want.min(DIRECT_COUNT) {
            self.direct[next] = Self::alloc_zeroed(block_device, free_map, fresh)?.into();
            next += 1;
        }
        self.num_sectors = next as u32;
        /******************** END ********************/

        if want <= DIRECT_COUNT {
            return Ok(());
        }

        /******************** 一级索引 ********************/
        if next < INDIRECT_CAP {
            // 这次增长经过了直接索引的边界，创建一级索引块
            if next == DIRECT_COUNT {
                self.indirect = Self::alloc_zeroed(block_device, free_map, fresh)?.into();
            }

            let mut table = Sector::read(self.indirect.into(), block_device)?;
            let indirect: &mut IndexBlock = table.get_mut(0);
            while next < want.min(INDIRECT_CAP) {
                indirect[next - DIRECT_COUNT] =
                    Self::alloc_zeroed(block_device, free_map, fresh)?.into();
                next += 1;
            }
            table.write(block_device)?;
            self.num_sectors = next as u32;
        }
        /******************** END ********************/

        if want <= INDIRECT_CAP {
            return Ok(());
        }

        /******************** 二级索引 ********************/
        if next == INDIRECT_CAP {
            self.doubly_indirect = Self::alloc_zeroed(block_device, free_map, fresh)?.into();
        }

        let mut outer = Sector::read(self.doubly_indirect.into(), block_device)?;
        while next < want {
            let index = next - INDIRECT_CAP;
            let mut inner_index = index % INDIRECT_COUNT;
            let doubly: &mut IndexBlock = outer.get_mut(0);
            // 内层索引为0表示进入新的一级索引块
            if inner_index == 0 {
                doubly[index / INDIRECT_COUNT] =
                    Self::alloc_zeroed(block_device, free_map, fresh)?.into();
            }

            let mut table = Sector::read(doubly[index / INDIRECT_COUNT].into(), block_device)?;
            let indirect: &mut IndexBlock = table.get_mut(0);
            while next < want && inner_index < INDIRECT_COUNT {
                indirect[inner_index] = Self::alloc_zeroed(block_device, free_map, fresh)?.into();
                inner_index += 1;
                next += 1;
            }
            table.write(block_device)?;
        }
        outer.write(block_device)?;
        self.num_sectors = next as u32;
        /******************** END ********************/

        Ok(())
    }

    /// 分配一个扇区并清零，使未写过的区域读出0
    fn alloc_zeroed(
        block_device: &Arc<dyn BlockDevice>,
        free_map: &mut FreeMap,
        fresh: &mut Vec<SectorId>,
    ) -> Result<SectorId> {
        let sector = free_map.allocate(1)?;
        fresh.push(sector);
        Sector::zeroed(sector).write(block_device)?;
        Ok(sector)
    }

    /// 收集全部数据块与索引块
    pub fn sectors(&self, block_device: &Arc<dyn BlockDevice>) -> Result<Vec<SectorId>> {
        let data_blocks = self.num_sectors();
        let mut sectors = Vec::with_capacity(self.total_sectors());

        /******************** 直接索引 ********************/
        sectors.extend(
            self.direct[..data_blocks.min(DIRECT_COUNT)]
                .iter()
                .copied()
                .map(SectorId::from),
        );
        /******************** END ********************/

        if data_blocks <= DIRECT_COUNT {
            return Ok(sectors);
        }

        /******************** 一级索引 ********************/
        sectors.push(self.indirect.into());
        let count = (data_blocks - DIRECT_COUNT).min(INDIRECT_COUNT);
        Sector::read(self.indirect.into(), block_device)?.map(0, |indirect: &IndexBlock| {
            sectors.extend(indirect[..count].iter().copied().map(SectorId::from))
        });
        /******************** END ********************/

        if data_blocks <= INDIRECT_CAP {
            return Ok(sectors);
        }

        /******************** 二级索引 ********************/
        sectors.push(self.doubly_indirect.into());
        let rest = data_blocks - INDIRECT_CAP;
        let outer = Sector::read(self.doubly_indirect.into(), block_device)?;
        let doubly: &IndexBlock = outer.get(0);
        for (i, &table) in doubly.iter().take(rest.div_ceil(INDIRECT_COUNT)).enumerate() {
            sectors.push(table.into());
            let count = (rest - i * INDIRECT_COUNT).min(INDIRECT_COUNT);
            Sector::read(table.into(), block_device)?.map(0, |indirect: &IndexBlock| {
                sectors.extend(indirect[..count].iter().copied().map(SectorId::from))
            });
        }
        /******************** END ********************/

        Ok(sectors)
    }

    /// 把全部数据块与索引块归还给位图，不含 inode 自身所在扇区
    pub fn release(&self, block_device: &Arc<dyn BlockDevice>, free_map: &mut FreeMap) -> Result<()> {
        for sector in self.sectors(block_device)? {
            free_map.release(sector, 1)?;
        }
        Ok(())
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，越过末尾的部分不读
    pub fn read_at(
        &self,
        offset: usize,
        buf: &mut [u8],
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<usize> {
        let mut start = offset;
        let end = offset.saturating_add(buf.len()).min(self.len());

        // 已读取多少字节
        let mut read_size = 0;
        while start < end {
            // 当前块的末地址(字节)
            let current_block_end = ((start / SECTOR_SIZE + 1) * SECTOR_SIZE).min(end);
            let block_read_size = current_block_end - start;
            let inner = start % SECTOR_SIZE;

            let sector = Sector::read(self.byte_to_sector(start, block_device)?, block_device)?;
            buf[read_size..read_size + block_read_size]
                .copy_from_slice(&sector.bytes()[inner..inner + block_read_size]);

            read_size += block_read_size;
            start = current_block_end;
        }

        Ok(read_size)
    }

    /// 向指定位置写入`buf`，写入范围须已被长度覆盖
    pub fn write_at(
        &self,
        offset: usize,
        buf: &[u8],
        block_device: &Arc<dyn BlockDevice>,
    ) -> Result<usize> {
        let mut start = offset;
        let end = offset + buf.len();
        if end > self.len() {
            return Err(Error::OutOfRange);
        }

        let mut written_size = 0;
        while start < end {
            let current_block_end = ((start / SECTOR_SIZE + 1) * SECTOR_SIZE).min(end);
            let block_write_size = current_block_end - start;
            let inner = start % SECTOR_SIZE;

            let id = self.byte_to_sector(start, block_device)?;
            // 整块覆盖时无需先读出
            let mut sector = if block_write_size == SECTOR_SIZE {
                Sector::zeroed(id)
            } else {
                Sector::read(id, block_device)?
            };
            sector.bytes_mut()[inner..inner + block_write_size]
                .copy_from_slice(&buf[written_size..written_size + block_write_size]);
            sector.write(block_device)?;

            written_size += block_write_size;
            start = current_block_end;
        }

        Ok(written_size)
    }

    /// 容纳`data_blocks`个数据块需要多少个索引块
    pub fn count_index_sectors(data_blocks: usize) -> usize {
        let mut total = 0;

        // 超出直接索引，使用一级索引块
        if data_blocks > DIRECT_COUNT {
            total += 1;
        }

        // 超出一级索引，使用二级索引块及其下的一级索引块
        if data_blocks > INDIRECT_CAP {
            total += 1 + (data_blocks - INDIRECT_CAP).div_ceil(INDIRECT_COUNT);
        }

        total
    }
}
