use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use crate::error::ErrorKind;
use crate::pkt::{ChunkBuf, FragMode, Packet, Packets, Segment, read_bits, write_bits, write_bytes_at};

fn two_seg_packet() -> Packet {
    let mut pkt = Packet::new();
    pkt.append_seg(Segment::new(vec![1, 2, 3]));
    pkt.append_seg(Segment::new(vec![4, 5]));
    pkt
}

#[test]
fn packet_fragment_views_span_segments() {
    let pkt = two_seg_packet();
    assert_eq!(pkt.len(), 5);
    assert_eq!(pkt.seg_num(), 2);
    assert_eq!(pkt.as_contiguous(), None);

    let frag = pkt.get_frag(2, 2, FragMode::Error).unwrap();
    assert_eq!(frag.to_vec(), vec![3, 4]);
    assert_eq!(frag.seg_num(), 2);

    assert_eq!(
        pkt.get_frag(4, 3, FragMode::Error).unwrap_err().kind(),
        ErrorKind::LessData
    );
    assert_eq!(pkt.get_frag(4, 3, FragMode::Trunc).unwrap().to_vec(), vec![5]);
    assert_eq!(pkt.get_frag(4, 3, FragMode::Zero).unwrap().to_vec(), vec![5, 0, 0]);
    assert_eq!(pkt.get_frag(4, 3, FragMode::Rand).unwrap().len(), 3);
    assert!(pkt.get_frag(5, 0, FragMode::Error).unwrap().is_empty());
}

#[test]
fn packet_fragment_shares_buffer() {
    let data = Bytes::from(vec![7u8; 32]);
    let pkt = Packet::from_bytes(data.clone());
    let frag = pkt.get_frag(8, 8, FragMode::Error).unwrap();
    let seg = frag.first_seg().unwrap();
    assert_eq!(seg.as_slice().as_ptr(), data[8..].as_ptr());
}

#[test]
fn packet_read_and_bit_access() {
    let pkt = two_seg_packet();
    let mut buf = [0u8; 3];
    pkt.read(1, &mut buf).unwrap();
    assert_eq!(buf, [2, 3, 4]);
    assert_eq!(pkt.read(3, &mut buf).unwrap_err().kind(), ErrorKind::LessData);

    // 0x03 0x04 跨段：低 4 位加高 4 位
    assert_eq!(pkt.read_bits(20, 8).unwrap(), 0x30);

    let mut out = [0u8; 2];
    pkt.read_bits_to(4, 12, &mut out).unwrap();
    assert_eq!(out, [0x10, 0x20]);
}

#[test]
fn packet_match_bytes_and_mask() {
    let pkt = Packet::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
    assert!(pkt.match_bytes(&[0xde, 0xad], false).is_ok());
    assert_eq!(pkt.match_bytes(&[0xde, 0xad], true).unwrap_err().kind(), ErrorKind::NotMatch);
    assert_eq!(pkt.match_bytes(&[0xde, 0xaa], false).unwrap_err().kind(), ErrorKind::NotMatch);

    assert!(pkt.match_mask(&[0xf0, 0x0f], &[0xd0, 0x0d], false).is_ok());
    assert_eq!(
        pkt.match_mask(&[0xff], &[0xdf], false).unwrap_err().kind(),
        ErrorKind::NotMatch
    );
    assert!(pkt.match_mask(&[0; 4], &[0; 4], true).is_ok());
    assert_eq!(pkt.match_mask(&[0; 3], &[0; 2], false).unwrap_err().kind(), ErrorKind::WrongNds);
}

#[test]
fn bits_write_and_read_unaligned() {
    let mut buf = [0u8; 2];
    write_bits(&mut buf, 4, 0xabc, 12).unwrap();
    assert_eq!(buf, [0x0a, 0xbc]);
    assert_eq!(read_bits(&buf, 4, 12).unwrap(), 0xabc);

    let mut buf = [0xffu8; 3];
    write_bytes_at(&mut buf, 4, &[0x12, 0x34]).unwrap();
    assert_eq!(buf, [0xf1, 0x23, 0x4f]);

    assert_eq!(write_bits(&mut buf, 20, 0, 8).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(read_bits(&buf, 20, 8).unwrap_err().kind(), ErrorKind::LessData);
}

#[test]
fn packets_prepend_shared_segment_frees_once() {
    let freed = Arc::new(AtomicUsize::new(0));
    let mut pkts = Packets::new();
    pkts.add(Packet::from_bytes(vec![1]));
    pkts.add(Packet::from_bytes(vec![2, 2]));

    let hdr = Bytes::from_static(&[0xaa, 0xbb]);
    let counter = freed.clone();
    pkts.prepend_shared_seg(
        hdr,
        Some(Box::new(move |_: &Bytes| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );
    assert_eq!(pkts.total_len(), 2 + 2 + 1 + 2);

    let mut with_free = 0;
    pkts.enumerate_first_segs(|seg, _| {
        assert_eq!(seg.as_slice(), &[0xaa, 0xbb]);
        with_free += usize::from(seg.has_free());
        Ok(())
    })
    .unwrap();
    assert_eq!(with_free, 1);

    pkts.enumerate(|pkt, _| {
        pkt.append_seg(Segment::zeroed(1));
        Ok(())
    })
    .unwrap();
    assert_eq!(pkts.total_len(), 9);

    drop(pkts);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
}

#[test]
fn packets_move_from_empties_source() {
    let mut sdus = Packets::alloc(3);
    let mut pdus = Packets::new();
    pdus.move_from(&mut sdus);
    assert!(sdus.is_empty());
    assert_eq!(pdus.len(), 3);
    assert_eq!(pdus.total_len(), 0);
}

#[test]
fn chunk_buf_freezes_one_segment_per_chunk() {
    let mut buf = ChunkBuf::new(4);
    buf.append(&[1, 2, 3]);
    buf.append_with(7, |chunk| chunk.fill(9));
    assert_eq!(buf.len(), 10);
    assert_eq!(buf.chunk_count(), 3);
    assert_eq!(buf.to_vec(), vec![1, 2, 3, 9, 9, 9, 9, 9, 9, 9]);

    let pkt = buf.into_packet();
    assert_eq!(pkt.seg_num(), 3);
    assert_eq!(pkt.to_vec(), vec![1, 2, 3, 9, 9, 9, 9, 9, 9, 9]);
}
