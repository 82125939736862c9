use std::io;

use bytes::{Buf, BufMut, BytesMut};

use tokio_util::codec::{Decoder, Encoder};

use crate::FeedLine;

/// Frames the APRS-IS stream. Inbound lines end in `\r\n`, `\n` or a lone
/// `\r`; outbound lines are terminated with `\r\n`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FeedLineCodec {
    next_index: usize,
    /// The last line ended in `\r` at the end of the buffer, so a `\n` at the
    /// start of the next read belongs to that terminator.
    saw_cr: bool,
}

impl FeedLineCodec {
    pub fn new() -> FeedLineCodec {
        FeedLineCodec {
            next_index: 0,
            saw_cr: false,
        }
    }
}

fn is_terminator(b: &u8) -> bool {
    *b == b'\n' || *b == b'\r'
}

impl Decoder for FeedLineCodec {
    type Item = FeedLine;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<FeedLine>, io::Error> {
        if self.saw_cr {
            if buf.is_empty() {
                return Ok(None);
            }
            if buf[0] == b'\n' {
                buf.advance(1);
            }
            self.saw_cr = false;
        }

        let read_to = buf.len();

        // only scan bytes that arrived since the last call
        let end = buf[self.next_index..read_to].iter().position(is_terminator);

        match end {
            Some(offset) => {
                let end_index = offset + self.next_index;
                self.next_index = 0;
                let mut line = buf.split_to(end_index + 1);
                let terminator = line[end_index];
                line.truncate(end_index);
                if terminator == b'\r' {
                    match buf.first() {
                        Some(&b'\n') => buf.advance(1),
                        Some(_) => {}
                        None => self.saw_cr = true,
                    }
                }
                Ok(Some(FeedLine::new(line.to_vec())))
            }
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<FeedLine>, io::Error> {
        Ok(match self.decode(buf)? {
            Some(line) => Some(line),
            None => {
                self.next_index = 0;
                self.saw_cr = false;
                if buf.is_empty() {
                    None
                } else {
                    let line = buf.split_to(buf.len());
                    Some(FeedLine::new(line.to_vec()))
                }
            }
        })
    }
}

impl<T> Encoder<T> for FeedLineCodec
where
    T: AsRef<[u8]>,
{
    type Error = io::Error;

    fn encode(&mut self, line: T, buf: &mut BytesMut) -> Result<(), io::Error> {
        let line = line.as_ref();
        buf.reserve(line.len() + 2);
        buf.put(line);
        buf.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut FeedLineCodec, buf: &mut BytesMut) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            lines.push(line.raw);
        }
        lines
    }

    #[test]
    fn strips_crlf_and_lf() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::from(&b"# aprsc 2.1.14\r\nN0CALL>APRS:>hi\n"[..]);

        let lines = decode_all(&mut codec, &mut buf);

        assert_eq!(
            lines,
            vec![b"# aprsc 2.1.14".to_vec(), b"N0CALL>APRS:>hi".to_vec()]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn keeps_empty_lines() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::from(&b"\r\n\nx\r\n"[..]);

        let lines = decode_all(&mut codec, &mut buf);

        assert_eq!(lines, vec![Vec::new(), Vec::new(), b"x".to_vec()]);
    }

    #[test]
    fn waits_for_the_rest_of_a_partial_line() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::from(&b"N0CALL>AP"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.next_index, 9);

        buf.extend_from_slice(b"RS:>hi");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.next_index, 15);

        buf.extend_from_slice(b"\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line.raw, b"N0CALL>APRS:>hi".to_vec());
        assert_eq!(codec.next_index, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn flushes_unterminated_fragment_at_eof() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::from(&b"tail"[..]);

        let line = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(line.raw, b"tail".to_vec());
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn lone_carriage_return_ends_a_line() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::from(&b"a\rb\r\nc\n"[..]);

        let lines = decode_all(&mut codec, &mut buf);

        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn crlf_split_across_reads_is_one_terminator() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::from(&b"first\r"[..]);

        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line.raw, b"first".to_vec());
        assert!(codec.saw_cr);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\nsecond\n");
        let lines = decode_all(&mut codec, &mut buf);
        assert_eq!(lines, vec![b"second".to_vec()]);
        assert!(!codec.saw_cr);
    }

    #[test]
    fn cr_cr_is_an_empty_line() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::from(&b"x\r\ry\n"[..]);

        let lines = decode_all(&mut codec, &mut buf);

        assert_eq!(lines, vec![b"x".to_vec(), Vec::new(), b"y".to_vec()]);
    }

    #[test]
    fn lone_carriage_return_at_eof_is_an_empty_line() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::from(&b"\r"[..]);

        let line = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert!(line.raw.is_empty());
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_appends_crlf() {
        let mut codec = FeedLineCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode("user N0CALL pass -1 vers test 1.0", &mut buf)
            .unwrap();

        assert_eq!(&buf[..], &b"user N0CALL pass -1 vers test 1.0\r\n"[..]);
    }
}
