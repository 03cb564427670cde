//! UDP header parsing (spec.md section 4.8 step 3).

use crate::datum::Datum;

pub struct UdpDatagram<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Datum<'a>,
}

/// Parse an 8-byte UDP header. `length` is trusted to match the remaining
/// capture bytes; callers needing an exact trim should do so themselves.
pub fn parse<'a>(mut d: Datum<'a>) -> Option<UdpDatagram<'a>> {
    let src_port = d.read_uint_be(2)? as u16;
    let dst_port = d.read_uint_be(2)? as u16;
    d.skip(2); // length
    d.skip(2); // checksum
    Some(UdpDatagram { src_port, dst_port, payload: d })
}
