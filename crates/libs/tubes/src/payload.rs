//! Byte-ish inputs accepted by send and receive operations.

use std::borrow::Cow;

/// Data or delimiter handed to a tube.
///
/// Anything that is a single byte, a character, a byte sequence or text
/// converts into a `Payload`, so operations can take `impl Into<Payload>`:
///
/// ```
/// use tubes::Payload;
///
/// assert_eq!(Payload::from(b'|').into_bytes(), b"|");
/// assert_eq!(Payload::from('|').into_bytes(), b"|");
/// assert_eq!(Payload::from("a|b").into_bytes(), b"a|b");
/// assert_eq!(Payload::from(&b"a|b"[..]).into_bytes(), b"a|b");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    Byte(u8),
    /// Encoded as UTF-8.
    Char(char),
    Bytes(Cow<'a, [u8]>),
    Text(Cow<'a, str>),
}

impl Payload<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Byte(_) => 1,
            Self::Char(c) => c.len_utf8(),
            Self::Bytes(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalizes the payload into the bytes put on (or matched against) the wire.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Byte(b) => vec![b],
            Self::Char(c) => {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf).as_bytes().to_vec()
            }
            Self::Bytes(bytes) => bytes.into_owned(),
            Self::Text(text) => text.into_owned().into_bytes(),
        }
    }
}

impl From<u8> for Payload<'_> {
    fn from(b: u8) -> Self {
        Self::Byte(b)
    }
}

impl From<char> for Payload<'_> {
    fn from(c: char) -> Self {
        Self::Char(c)
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(Cow::Borrowed(bytes))
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Payload<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Self::Bytes(Cow::Borrowed(&bytes[..]))
    }
}

impl<'a> From<&'a Vec<u8>> for Payload<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::Bytes(Cow::Borrowed(bytes.as_slice()))
    }
}

impl From<Vec<u8>> for Payload<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Cow::Owned(bytes))
    }
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(Cow::Borrowed(text))
    }
}

impl<'a> From<&'a String> for Payload<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(Cow::Borrowed(text.as_str()))
    }
}

impl From<String> for Payload<'_> {
    fn from(text: String) -> Self {
        Self::Text(Cow::Owned(text))
    }
}
