//! 报文段

use std::fmt;
use std::ops::RangeBounds;

use bytes::Bytes;

/// 段释放回调，在段被丢弃时以段数据调用一次
pub type SegFree = Box<dyn FnOnce(&Bytes) + Send>;

/// 报文段：一段字节及可选的释放回调
///
/// 克隆得到的段共享同一缓冲区但不携带回调，保证回调只执行一次。
pub struct Segment {
    data: Bytes,
    free: Option<SegFree>,
}

impl Segment {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            free: None,
        }
    }

    /// 分配长度为 `len` 的全零段
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    pub fn with_free(data: impl Into<Bytes>, free: SegFree) -> Self {
        Self {
            data: data.into(),
            free: Some(free),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn has_free(&self) -> bool {
        self.free.is_some()
    }

    /// 同一缓冲区上的子视图（无回调）
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Segment {
        Segment::new(self.data.slice(range))
    }
}

impl Clone for Segment {
    fn clone(&self) -> Self {
        Segment::new(self.data.clone())
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Some(free) = self.free.take() {
            free(&self.data);
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("len", &self.data.len())
            .field("free", &self.free.is_some())
            .finish()
    }
}

impl From<Vec<u8>> for Segment {
    fn from(v: Vec<u8>) -> Self {
        Segment::new(v)
    }
}

impl From<Bytes> for Segment {
    fn from(b: Bytes) -> Self {
        Segment::new(b)
    }
}
