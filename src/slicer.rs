use bytes::Bytes;

use crate::ofp_header::{OfpHeader, OFP_HEADER_LENGTH};

/// Splits an accumulated byte buffer into complete OpenFlow frames.
///
/// Each item is one whole message, header included. Iteration stops at the first frame
/// that is not completely in the buffer; `remainder` then returns the unconsumed tail,
/// which must be prepended to the next chunk read from the connection.
#[derive(Clone, Debug)]
pub struct OfpSlicer<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> OfpSlicer<'a> {
    pub fn new(data: &'a [u8]) -> OfpSlicer<'a> {
        OfpSlicer { data, offset: 0 }
    }

    /// Bytes not yet handed out as frames.
    pub fn remainder(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Whether the frame at the front of the remainder declares a length shorter than a
    /// header. Such a stream cannot be resynchronised.
    pub fn is_malformed(&self) -> bool {
        match OfpHeader::peek_length(self.remainder()) {
            Some(length) => length < OFP_HEADER_LENGTH,
            None => false,
        }
    }
}

impl<'a> Iterator for OfpSlicer<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let rest = self.remainder();
        let length = OfpHeader::peek_length(rest)?;
        if length < OFP_HEADER_LENGTH || rest.len() < length {
            return None;
        }
        self.offset += length;
        Some(&rest[..length])
    }
}

/// Slice `data` into complete frames and the leftover remainder.
pub fn of_slicer(data: &Bytes) -> (Vec<Bytes>, Bytes) {
    let mut frames = vec![];
    let mut offset = 0;
    for frame in OfpSlicer::new(data) {
        frames.push(data.slice(offset..offset + frame.len()));
        offset += frame.len();
    }
    (frames, data.slice(offset..))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(typ: u8, body: &[u8]) -> Vec<u8> {
        let length = (OFP_HEADER_LENGTH + body.len()) as u16;
        let mut data = vec![4, typ, (length >> 8) as u8, length as u8, 0, 0, 0, typ];
        data.extend_from_slice(body);
        data
    }

    fn stream(bodies: &[Vec<u8>]) -> Vec<u8> {
        bodies.iter().enumerate().flat_map(|(i, body)| frame(i as u8 % 20, body)).collect()
    }

    #[test]
    fn test_less_than_header_is_remainder() {
        let data = Bytes::from_static(&[4, 0, 0]);
        let (frames, rest) = of_slicer(&data);
        assert!(frames.is_empty());
        assert_eq!(rest, data);
    }

    #[test]
    fn test_partial_frame_is_remainder() {
        let mut data = frame(2, b"hello");
        data.truncate(10);
        let data = Bytes::from(data);
        let (frames, rest) = of_slicer(&data);
        assert!(frames.is_empty());
        assert_eq!(rest.len(), 10);
    }

    #[test]
    fn test_frames_and_tail() {
        let mut data = frame(0, b"");
        data.extend(frame(2, b"abc"));
        data.extend(&frame(3, b"xyz")[..9]);
        let data = Bytes::from(data);

        let (frames, rest) = of_slicer(&data);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 8);
        assert_eq!(&frames[1][8..], b"abc");
        assert_eq!(rest.len(), 9);
    }

    #[test]
    fn test_short_length_is_malformed() {
        let data = [4, 0, 0, 4, 0, 0, 0, 1, 0, 0];
        let mut slicer = OfpSlicer::new(&data);
        assert_eq!(slicer.next(), None);
        assert!(slicer.is_malformed());
        assert_eq!(slicer.remainder().len(), 10);

        let slicer = OfpSlicer::new(&data[..4]);
        assert!(!slicer.is_malformed());
    }

    fn slice_in_chunks(data: &[u8], cuts: &[usize]) -> (Vec<Vec<u8>>, Vec<u8>) {
        let mut frames = vec![];
        let mut pending = Bytes::new();
        let mut start = 0;
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
        points.sort_unstable();
        points.push(data.len());
        for end in points {
            let mut joined = pending.to_vec();
            joined.extend_from_slice(&data[start..end]);
            let (out, rest) = of_slicer(&Bytes::from(joined));
            frames.extend(out.into_iter().map(|f| f.to_vec()));
            pending = rest;
            start = end;
        }
        (frames, pending.to_vec())
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_frames(
            bodies in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
            cuts in prop::collection::vec(any::<usize>(), 0..16),
            tail in 0usize..8,
        ) {
            let mut data = stream(&bodies);
            data.extend(std::iter::repeat(0xff).take(tail));

            let (whole, whole_rest) = of_slicer(&Bytes::from(data.clone()));
            let whole: Vec<Vec<u8>> = whole.into_iter().map(|f| f.to_vec()).collect();
            let (chunked, chunked_rest) = slice_in_chunks(&data, &cuts);

            prop_assert_eq!(whole.len(), bodies.len());
            prop_assert_eq!(&chunked, &whole);
            prop_assert_eq!(chunked_rest, whole_rest.to_vec());
        }

        #[test]
        fn incomplete_frame_is_offered_again(body in prop::collection::vec(any::<u8>(), 0..64),
                                             cut in 0usize..72) {
            let data = frame(2, &body);
            let cut = cut % data.len();
            let (frames, rest) = of_slicer(&Bytes::from(data[..cut].to_vec()));
            prop_assert!(frames.is_empty());
            prop_assert_eq!(rest.len(), cut);

            let mut joined = rest.to_vec();
            joined.extend_from_slice(&data[cut..]);
            let (frames, rest) = of_slicer(&Bytes::from(joined));
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(frames[0].to_vec(), data);
            prop_assert!(rest.is_empty());
        }
    }
}
