//! By-block reading: resynchronization, boundary events, and position
//! reporting.

mod common;

use bzsplit_decoder::{BzDecoder, BzError, ReadMode, ReadOutcome, ReadStatus};
use std::io::Cursor;

/// Every event a by-block walk produces, with the position reported after
/// each boundary.
#[derive(Debug, PartialEq)]
enum Event {
    Block(Vec<u8>),
    Boundary(u64),
    End,
}

fn walk_blocks(input: Vec<u8>) -> (Vec<Event>, BzDecoder<Cursor<Vec<u8>>>) {
    let mut decoder = BzDecoder::new(Cursor::new(input), ReadMode::ByBlock).unwrap();
    let mut events = Vec::new();
    let mut current = Vec::new();
    loop {
        match decoder.read_byte().unwrap() {
            ReadOutcome::Byte(b) => current.push(b),
            ReadOutcome::EndOfBlock => {
                events.push(Event::Block(std::mem::take(&mut current)));
                events.push(Event::Boundary(decoder.reported_bytes_consumed()));
            }
            ReadOutcome::EndOfStream => {
                assert!(current.is_empty(), "stream ended mid-block");
                events.push(Event::End);
                return (events, decoder);
            }
        }
    }
}

#[test]
fn empty_stream_ends_immediately() {
    let stream = common::compress(&[], 9);
    let total = stream.len() as u64;
    let (events, decoder) = walk_blocks(stream);
    assert_eq!(events, vec![Event::End]);
    // The failed delimiter scan consumed the whole source.
    assert_eq!(decoder.reported_bytes_consumed(), total);
}

#[test]
fn single_block_positions() {
    let payload: &[u8] = b"Hello, world!\n";
    let stream = common::compress(&[payload], 9);
    let total = stream.len() as u64;

    let decoder = BzDecoder::new(Cursor::new(stream.clone()), ReadMode::ByBlock).unwrap();
    // The first delimiter sits right after the 2-byte stream header.
    assert_eq!(decoder.reported_bytes_consumed(), 2);
    drop(decoder);

    let (events, _) = walk_blocks(stream);
    assert_eq!(
        events,
        vec![
            Event::Block(payload.to_vec()),
            Event::Boundary(total),
            Event::End,
        ]
    );
}

#[test]
fn concatenated_streams_report_block_offsets() {
    // `cat a.bz2 b.bz2` with the leading magic stripped from the first.
    let s1 = common::compress(&[b"A".as_slice()], 9);
    let s2 = common::compress(&[b"B".as_slice()], 9);
    let mut input = s1.clone();
    input.extend_from_slice(b"BZ");
    input.extend_from_slice(&s2);
    let total = input.len() as u64;

    // Second stream's delimiter: after the first stream, its "BZ" magic
    // and its two header bytes.
    let second_marker = s1.len() as u64 + 2 + 2;

    let (events, _) = walk_blocks(input);
    assert_eq!(
        events,
        vec![
            Event::Block(b"A".to_vec()),
            Event::Boundary(second_marker),
            Event::Block(b"B".to_vec()),
            Event::Boundary(total),
            Event::End,
        ]
    );
}

#[test]
fn multi_block_stream_yields_each_block() {
    let p1 = common::pseudo_random(1200, 11);
    let p2 = vec![b'q'; 3_000];
    let stream = common::compress(&[p1.as_slice(), p2.as_slice()], 1);

    let (events, _) = walk_blocks(stream);
    match &events[..] {
        [Event::Block(b1), Event::Boundary(o1), Event::Block(b2), Event::Boundary(o2), Event::End] =>
        {
            assert_eq!(*b1, p1);
            assert_eq!(*b2, p2);
            assert!(o1 < o2);
        }
        other => panic!("unexpected event sequence: {other:?}"),
    }
}

#[test]
fn randomized_blocks_decode_by_block() {
    let payload = vec![b'r'; 2_500];
    let stream = common::compress_randomized(&[payload.as_slice()], 9);
    let (events, _) = walk_blocks(stream);
    assert_eq!(events[0], Event::Block(payload));
}

#[test]
fn reported_position_is_monotonic_and_bounded() {
    let p1 = common::pseudo_random(800, 5);
    let p2 = common::pseudo_random(800, 6);
    let stream = common::compress(&[p1.as_slice(), p2.as_slice()], 1);

    let mut decoder = BzDecoder::new(Cursor::new(stream), ReadMode::ByBlock).unwrap();
    let mut last_reported = 0u64;
    loop {
        let outcome = decoder.read_byte().unwrap();
        let reported = decoder.reported_bytes_consumed();
        assert!(reported >= last_reported, "reported position regressed");
        assert!(
            reported <= decoder.compressed_bytes_read(),
            "reported position ahead of raw consumption"
        );
        last_reported = reported;
        if outcome == ReadOutcome::EndOfStream {
            break;
        }
    }
}

#[test]
fn bulk_reads_see_the_same_boundaries() {
    let p1 = common::pseudo_random(700, 21);
    let p2 = vec![b'x'; 1_000];
    let stream = common::compress(&[p1.as_slice(), p2.as_slice()], 1);

    // Byte-at-a-time reference walk.
    let (expected_events, _) = walk_blocks(stream.clone());

    // Bulk walk with a small buffer.
    let mut decoder = BzDecoder::new(Cursor::new(stream), ReadMode::ByBlock).unwrap();
    let mut events = Vec::new();
    let mut current = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        match decoder.read_into(&mut buf).unwrap() {
            ReadStatus::Data(n) => current.extend_from_slice(&buf[..n]),
            ReadStatus::EndOfBlock => {
                events.push(Event::Block(std::mem::take(&mut current)));
                events.push(Event::Boundary(decoder.reported_bytes_consumed()));
            }
            ReadStatus::EndOfStream => {
                events.push(Event::End);
                break;
            }
        }
    }
    assert_eq!(events, expected_events);
}

#[test]
fn block_crc_still_enforced_by_block() {
    let payload: &[u8] = b"by-block crc check";
    let mut stream = common::compress(&[payload], 9);
    stream[11] ^= 0x80; // last stored-CRC byte

    let mut decoder = BzDecoder::new(Cursor::new(stream), ReadMode::ByBlock).unwrap();
    let err = loop {
        match decoder.read_byte() {
            Ok(ReadOutcome::Byte(_)) => continue,
            Ok(other) => panic!("expected a CRC failure, got {other:?}"),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, BzError::CrcMismatch { .. }));
}

#[test]
fn close_releases_and_is_idempotent() {
    let stream = common::compress(&[b"data".as_slice()], 9);
    let mut decoder = BzDecoder::new(Cursor::new(stream), ReadMode::ByBlock).unwrap();
    let reported = decoder.reported_bytes_consumed();

    decoder.close();
    decoder.close();

    // Position survives close; reads do not.
    assert_eq!(decoder.reported_bytes_consumed(), reported);
    assert!(matches!(
        decoder.read_byte(),
        Err(BzError::InvalidArgument { .. })
    ));
}

#[test]
fn adjust_accounts_for_stripped_magic() {
    let stream = common::compress(&[b"position".as_slice()], 9);
    let mut decoder = BzDecoder::new(Cursor::new(stream), ReadMode::ByBlock).unwrap();
    // Delimiter after the stream header, plus the 2 magic bytes the caller
    // stripped before construction.
    assert_eq!(decoder.reported_bytes_consumed(), 2);
    decoder.adjust_reported_bytes(2);
    assert_eq!(decoder.reported_bytes_consumed(), 4);
}
