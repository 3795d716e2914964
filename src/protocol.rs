//! Shared protocol constants for the tinyftp framed transport

// Protocol header constants
pub const MAGIC: &[u8; 6] = &[0xe3, b'm', b'y', b'f', b't', b'p'];

// magic(6) | opcode(1) | status(1) | total length(4, big-endian)
pub const HEADER_LEN: usize = 12;

// Largest FILE_DATA body expressible in the u32 total-length field
pub const MAX_FILE_LEN: u64 = u32::MAX as u64 - HEADER_LEN as u64;

// Filenames, credentials and empty bodies never come close to this
pub const MAX_CONTROL_PAYLOAD: usize = 4096;

// Upper bound accepted by the client for a LIST_REPLY body (64MB)
pub const MAX_LIST_PAYLOAD: usize = 64 * 1024 * 1024;

// Block size used when streaming file bodies between disk and socket
pub const CHUNK_SIZE: usize = 64 * 1024;

// Longest filename the store will accept
pub const MAX_NAME_LEN: usize = 255;

// Message type IDs (numeric values are the wire contract)
pub mod opcode {
    pub const OPEN_CONN_REQUEST: u8 = 0xA1;
    pub const OPEN_CONN_REPLY: u8 = 0xA2;
    pub const AUTH_REQUEST: u8 = 0xA3;
    pub const AUTH_REPLY: u8 = 0xA4;
    pub const LIST_REQUEST: u8 = 0xA5;
    pub const LIST_REPLY: u8 = 0xA6;
    pub const GET_REQUEST: u8 = 0xA7;
    pub const GET_REPLY: u8 = 0xA8;
    pub const PUT_REQUEST: u8 = 0xA9;
    pub const PUT_REPLY: u8 = 0xAA;
    pub const QUIT_REQUEST: u8 = 0xAB;
    pub const QUIT_REPLY: u8 = 0xAC;
    pub const FILE_DATA: u8 = 0xFF;
}

// Status byte values. Meaning is opcode-specific and unused on several replies.
pub mod status {
    pub const FAILURE: u8 = 0;
    pub const SUCCESS: u8 = 1;
}
