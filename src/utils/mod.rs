//! Utility functions: varint/delta coding and the ngram codec.

pub mod encoding;
pub mod ngram;

pub use encoding::{
    decode_varint, delta_decode, delta_encode, encode_varint, put_str, put_u16_be, put_u32_be,
    put_u64_be, DeltaIter, SliceReader,
};
pub use ngram::{
    bitmap_bit, decode_codepoint, fold_bitmap, fold_codepoint, fold_pattern, pack_ngram,
    unpack_ngram, CodepointIter, NgramIter, NGRAM_SIZE,
};
