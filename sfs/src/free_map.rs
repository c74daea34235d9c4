//! # 空闲扇区位图
//!
//! 整个设备的每个扇区对应一位，置位表示已分配。
//! 位图本身作为一个普通文件保存在[`FREE_MAP_SECTOR`]的 inode 中，
//! 每次修改之后立即写回受影响的扇区。

use alloc::sync::Arc;
use alloc::vec;
use core::ops::Range;

use block_dev::BlockDevice;

use crate::layout::{Bitmap, DiskInode, InodeKind};
use crate::sector::Sector;
use crate::{Error, FREE_MAP_SECTOR, ROOT_DIR_SECTOR, Result, SECTOR_SIZE, SectorId};

pub struct FreeMap {
    bitmap: Bitmap,
    /// 位图文件；格式化期间尚未建立，此时修改只留在内存中
    file: Option<DiskInode>,
    block_device: Arc<dyn BlockDevice>,
}

impl FreeMap {
    /// 全新的位图，只标记了保留扇区
    fn new(block_device: Arc<dyn BlockDevice>, total_sectors: usize) -> Self {
        let mut bitmap = Bitmap::new(total_sectors);
        bitmap.set(FREE_MAP_SECTOR.block(), true);
        bitmap.set(ROOT_DIR_SECTOR.block(), true);

        Self {
            bitmap,
            file: None,
            block_device,
        }
    }

    /// 格式化时建立位图文件，并把位图写入其中
    pub(crate) fn create(block_device: Arc<dyn BlockDevice>, total_sectors: usize) -> Result<Self> {
        let mut free_map = Self::new(block_device.clone(), total_sectors);

        let mut file = DiskInode::new(InodeKind::File, FREE_MAP_SECTOR);
        file.extend(
            free_map.bitmap.byte_len(),
            &block_device,
            &mut free_map,
            |file| file.store(FREE_MAP_SECTOR, &block_device),
        )?;

        free_map.file = Some(file);
        free_map.persist(0..total_sectors)?;
        Ok(free_map)
    }

    /// 挂载时从位图文件读出位图
    pub(crate) fn load(block_device: Arc<dyn BlockDevice>, total_sectors: usize) -> Result<Self> {
        let file = DiskInode::load(FREE_MAP_SECTOR, &block_device)?;
        let byte_len = total_sectors.div_ceil(8);
        if file.len() != byte_len {
            log::error!(
                "free map holds {} bytes, device needs {byte_len}",
                file.len()
            );
            return Err(Error::StructureCorrupt(FREE_MAP_SECTOR));
        }

        let mut bytes = vec![0; byte_len];
        file.read_at(0, &mut bytes, &block_device)?;

        Ok(Self {
            bitmap: Bitmap::from_bytes(total_sectors, &bytes),
            file: Some(file),
            block_device,
        })
    }

    /// 分配`count`个连续扇区并返回第一个。
    /// 写回位图失败时撤销这次分配。
    pub fn allocate(&mut self, count: usize) -> Result<SectorId> {
        let start = self.bitmap.scan_and_flip(count).ok_or(Error::NoSpace)?;

        if let Err(err) = self.persist(start..start + count) {
            self.bitmap.set_range(start, count, false);
            return Err(err);
        }

        log::trace!("allocate sectors {start}..{}", start + count);
        Ok(SectorId::new(start as u32))
    }

    /// 归还从`sector`开始的`count`个扇区，它们必须都已分配
    pub fn release(&mut self, sector: SectorId, count: usize) -> Result<()> {
        let start = sector.block();
        // 编号一定得有对应的位
        assert!(
            self.bitmap.all(start, count),
            "releasing unallocated sectors {start}..{}",
            start + count
        );

        self.bitmap.set_range(start, count, false);
        log::trace!("release sectors {start}..{}", start + count);
        self.persist(start..start + count)
    }

    /// 空闲扇区是否不少于`count`个。结果只在持有锁期间有效。
    #[inline]
    pub fn available(&self, count: usize) -> bool {
        self.free_count() >= count
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.bitmap.count_zeros()
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.bitmap.len()
    }

    #[inline]
    pub fn is_allocated(&self, sector: SectorId) -> bool {
        sector.block() < self.bitmap.len() && self.bitmap.test(sector.block())
    }

    /// 写回覆盖`bits`的位图文件扇区
    fn persist(&self, bits: Range<usize>) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        if bits.is_empty() {
            return Ok(());
        }

        let first_byte = bits.start / 8;
        let last_byte = (bits.end - 1) / 8;
        for index in first_byte / SECTOR_SIZE..=last_byte / SECTOR_SIZE {
            let begin = index * SECTOR_SIZE;
            let end = (begin + SECTOR_SIZE).min(self.bitmap.byte_len());

            let mut sector = Sector::zeroed(file.byte_to_sector(begin, &self.block_device)?);
            for (dest, i) in sector.bytes_mut().iter_mut().zip(begin..end) {
                *dest = self.bitmap.byte(i);
            }
            sector.write(&self.block_device)?;
        }

        Ok(())
    }
}
