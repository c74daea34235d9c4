use alloc::vec;
use alloc::vec::Vec;

/// 位组：以64位为一组存放位图
type BitGroup = u64;
const GROUP_BITS: usize = BitGroup::BITS as usize;

/// 扇区位图，每个扇区一位，置位表示已分配。
///
/// 持久化时按字节流存储：第`i`位位于第`i / 8`字节的第`i % 8`位，
/// 恰好是位组的小端字节序。
#[derive(Debug, Clone)]
pub struct Bitmap {
    groups: Vec<BitGroup>,
    /// 位图所指示的总位数
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        let mut bitmap = Self {
            groups: vec![0; len.div_ceil(GROUP_BITS)],
            len,
        };
        bitmap.seal_tail();
        bitmap
    }

    /// 从持久化的字节流重建位图，`bytes`至少需要[`Self::byte_len`]字节
    pub fn from_bytes(len: usize, bytes: &[u8]) -> Self {
        let mut bitmap = Self::new(len);
        for (i, &byte) in bytes.iter().take(bitmap.byte_len()).enumerate() {
            bitmap.groups[i / 8] |= (byte as BitGroup) << (i % 8 * 8);
        }
        bitmap.seal_tail();
        bitmap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 持久化所需的字节数
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.len.div_ceil(8)
    }

    /// 持久化字节流的第`index`字节
    #[inline]
    pub fn byte(&self, index: usize) -> u8 {
        (self.groups[index / 8] >> (index % 8 * 8)) as u8
    }

    #[inline]
    pub fn test(&self, index: usize) -> bool {
        self.groups[index / GROUP_BITS] & (1 << (index % GROUP_BITS)) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        let mask = 1 << (index % GROUP_BITS);
        if value {
            self.groups[index / GROUP_BITS] |= mask;
        } else {
            self.groups[index / GROUP_BITS] &= !mask;
        }
    }

    pub fn set_range(&mut self, start: usize, count: usize, value: bool) {
        for index in start..start + count {
            self.set(index, value);
        }
    }

    /// `[start, start + count)`是否全部置位
    pub fn all(&self, start: usize, count: usize) -> bool {
        start + count <= self.len && (start..start + count).all(|index| self.test(index))
    }

    /// 未置位的位数
    pub fn count_zeros(&self) -> usize {
        let zeros: u32 = self.groups.iter().map(|group| group.count_zeros()).sum();
        zeros as usize
    }

    /// 寻找`count`个连续的空位并置位，返回第一位的编号
    pub fn scan_and_flip(&mut self, count: usize) -> Option<usize> {
        let start = self.scan(count)?;
        self.set_range(start, count, true);
        Some(start)
    }

    fn scan(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.len {
            return None;
        }

        let mut start = 0;
        let mut run = 0;
        let mut index = 0;
        while index < self.len {
            // 没有进行中的空位段时，整组跳过已满的位组
            if run == 0 && index % GROUP_BITS == 0 {
                let skip = self.groups[index / GROUP_BITS].trailing_ones() as usize;
                if skip > 0 {
                    index += skip;
                    continue;
                }
            }

            if self.test(index) {
                run = 0;
            } else {
                if run == 0 {
                    start = index;
                }
                run += 1;
                if run == count {
                    return Some(start);
                }
            }
            index += 1;
        }

        None
    }

    /// 尾部多出的位永远视为已分配
    fn seal_tail(&mut self) {
        let tail = self.len % GROUP_BITS;
        if tail != 0 {
            if let Some(last) = self.groups.last_mut() {
                *last |= BitGroup::MAX << tail;
            }
        }
    }
}
