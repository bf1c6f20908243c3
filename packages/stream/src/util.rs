use std::cmp::min;
use std::fmt;
use std::fmt::Formatter;

const PAYLOAD_PREVIEW: usize = 100;

/// Debug view of a chunk: escaped text, truncated to [`PAYLOAD_PREVIEW`] bytes.
pub(crate) struct PayloadFmt<'a>(pub &'a [u8]);

impl fmt::Debug for PayloadFmt<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let slice = bstr::BStr::new(&self.0[..min(PAYLOAD_PREVIEW, self.0.len())]);
        write!(f, "{:?}", slice)?;
        if slice.len() < self.0.len() {
            write!(f, "... ({} bytes)", self.0.len())?;
        }
        Ok(())
    }
}
