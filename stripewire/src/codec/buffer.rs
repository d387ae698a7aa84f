/// A retained write position in a [`WireBuffer`], handed out when a
/// placeholder region is reserved and consumed when it is patched.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    pos: usize,
}

/// A growable byte buffer with big-endian primitive writers and
/// reserve-then-patch support for back-filled counts.
#[derive(Debug, Default)]
pub struct WireBuffer {
    buf: Vec<u8>,
}

impl WireBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Drops the backing storage entirely, unlike `clear()` which would keep
    /// the allocation alive.
    pub fn release(&mut self) {
        self.buf = Vec::new();
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Length-prefixed UTF-8 string.
    pub fn put_str(&mut self, v: &str) {
        self.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Length-prefixed opaque byte run.
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    /// Raw append without a length prefix. Used when concatenating
    /// already-framed sections.
    pub fn put_raw(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Reserves a 4-byte placeholder at the current position and returns a
    /// mark for patching it once the value is known.
    pub fn reserve_u32(&mut self) -> Mark {
        let mark = Mark { pos: self.buf.len() };
        self.buf.extend_from_slice(&[0; 4]);
        mark
    }

    /// Back-fills a placeholder reserved with [`reserve_u32`].
    ///
    /// [`reserve_u32`]: WireBuffer::reserve_u32
    pub fn patch_u32(&mut self, mark: Mark, v: u32) {
        self.buf[mark.pos..mark.pos + 4].copy_from_slice(&v.to_be_bytes());
    }
}
