#![allow(dead_code)]

use bitcoin_relay_core::target::decode_target;
use bitcoin_relay_core::{BlockHeader, Digest};

pub fn mine_header(prev: Digest, time: u32, bits: u32) -> BlockHeader {
    let target = decode_target(bits).unwrap();
    let mut header = BlockHeader {
        version: 0x2000_0000,
        prev_block_hash: prev,
        merkle_root: [0xa5; 32],
        time,
        bits,
        nonce: 0,
    };
    while header.digest().to_u256() > target {
        header.nonce += 1;
    }
    header
}

pub fn mine_chain(anchor: &BlockHeader, count: usize, spacing: u32, bits: u32) -> Vec<BlockHeader> {
    let mut headers: Vec<BlockHeader> = Vec::with_capacity(count);
    for _ in 0..count {
        let parent = headers.last().unwrap_or(anchor);
        let next = mine_header(parent.digest(), parent.time + spacing, bits);
        headers.push(next);
    }
    headers
}
