use bytes::BufMut;

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// Length is `usize` in rust, while postgres want `i32`,
    /// this will panic when overflow instead of wrapping.
    fn to_i32(self) -> i32;
    /// Length is `usize` in rust, while sometime postgres want `i16`,
    /// this will panic when overflow instead of wrapping.
    fn to_i16(self) -> i16;
}

/// Nul string operation.
pub trait StrExt {
    /// String length plus nul (1).
    fn nul_string_len(&self) -> usize;
}

/// Nul string operation in [`BufMut`].
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

impl UsizeExt for usize {
    fn to_i32(self) -> i32 {
        match i32::try_from(self) {
            Ok(ok) => ok,
            Err(_) => panic!("message size too large for protocol: {self}"),
        }
    }

    fn to_i16(self) -> i16 {
        match i16::try_from(self) {
            Ok(ok) => ok,
            Err(_) => panic!("item count too large for protocol: {self}"),
        }
    }
}

impl StrExt for str {
    fn nul_string_len(&self) -> usize {
        self.len() + 1/* nul */
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}
