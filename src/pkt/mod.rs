//! 报文片段列表
//!
//! 报文（[`Packet`]）是有序的段（[`Segment`]）列表，报文列表
//! （[`Packets`]）是一次生成/匹配中流经各层的 PDU/SDU 集合。段的底层
//! 缓冲区可以在多个报文之间共享，释放回调只挂在其中一个段上。

mod bits;
mod chunk;
mod packet;
mod packets;
mod segment;

pub use bits::{read_bits, write_bits, write_bytes_at};
pub use chunk::ChunkBuf;
pub use packet::{FragMode, Packet};
pub use packets::Packets;
pub use segment::{SegFree, Segment};
