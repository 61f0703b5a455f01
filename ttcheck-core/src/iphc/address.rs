//! Address modes (SAC/SAM, M/DAC/DAM)

use super::context::ContextTable;
use crate::constants::{LINK_LOCAL_PREFIX, SHORT_ADDR_IID_PREFIX};
use crate::error::DecodeError;
use std::net::Ipv6Addr;

/// Chosen encoding of one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AddressEncoding {
    pub ac: bool,
    pub am: u8,
    pub context: Option<u8>,
    pub inline: Vec<u8>,
}

/// Encode a unicast address
///
/// `is_source` enables the SAC=1/SAM=0 form for the unspecified address.
pub(crate) fn compress_unicast(
    addr: &Ipv6Addr,
    iid: Option<&[u8; 8]>,
    contexts: &ContextTable,
    is_source: bool,
) -> AddressEncoding {
    let a = addr.octets();

    if is_source && addr.is_unspecified() {
        return AddressEncoding {
            ac: true,
            am: 0,
            context: None,
            inline: Vec::new(),
        };
    }

    let mut am = if iid.is_some_and(|hw| a[8..] == hw[..]) {
        3
    } else if a[8..14] == SHORT_ADDR_IID_PREFIX {
        2
    } else {
        1
    };

    let (ac, context) = if a[..8] == LINK_LOCAL_PREFIX {
        (false, None)
    } else if let Some(id) = contexts.find_unicast(addr) {
        (true, Some(id))
    } else {
        am = 0;
        (false, None)
    };

    let inline = match (ac, am) {
        (false, 0) => a.to_vec(),
        (_, 2) => a[14..].to_vec(),
        (_, 3) => Vec::new(),
        _ => a[8..].to_vec(),
    };

    AddressEncoding {
        ac,
        am,
        context,
        inline,
    }
}

/// Encode a multicast destination
pub(crate) fn compress_multicast(addr: &Ipv6Addr, contexts: &ContextTable) -> AddressEncoding {
    let a = addr.octets();
    let zero = |r: std::ops::Range<usize>| a[r].iter().all(|b| *b == 0);

    let (dac, dam, context, inline) = if a[1] == 0x02 && zero(2..15) {
        (false, 3, None, vec![a[15]])
    } else if zero(2..13) {
        (false, 2, None, vec![a[1], a[13], a[14], a[15]])
    } else if zero(2..11) {
        let mut v = vec![a[1]];
        v.extend_from_slice(&a[11..]);
        (false, 1, None, v)
    } else {
        // unicast-prefix-based (RFC 3306): ff XX XX plen prefix[8] group[4]
        let mut prefix = [0u8; 16];
        prefix[..8].copy_from_slice(&a[4..12]);
        let candidate = super::context::ContextPrefix::new(Ipv6Addr::from(prefix), a[3])
            .ok()
            .filter(|p| p.octets() == &prefix);
        match candidate.and_then(|p| contexts.find_exact(&p)) {
            Some(id) => {
                let mut v = a[1..3].to_vec();
                v.extend_from_slice(&a[12..]);
                (true, 0, Some(id), v)
            }
            None => (false, 0, None, a.to_vec()),
        }
    };

    AddressEncoding {
        ac: dac,
        am: dam,
        context,
        inline,
    }
}

/// Inline bytes carried for a given mode
pub(crate) fn inline_len(ac: bool, am: u8, multicast: bool) -> usize {
    match (multicast, ac, am) {
        (false, true, 0) => 0,
        (false, _, 0) => 16,
        (false, _, 1) => 8,
        (false, _, 2) => 2,
        (false, _, _) => 0,
        (true, false, 0) => 16,
        (true, false, 1) => 6,
        (true, false, 2) => 4,
        (true, false, _) => 1,
        (true, true, 0) => 6,
        (true, true, _) => 0,
    }
}

/// Everything needed to rebuild one address
pub(crate) struct AddressInput<'a> {
    pub ac: bool,
    pub am: u8,
    pub inline: &'a [u8],
    pub cid: bool,
    pub context_id: u8,
    pub iid: Option<&'a [u8; 8]>,
}

fn context_prefix(input: &AddressInput<'_>, contexts: &ContextTable) -> Result<[u8; 16], DecodeError> {
    if !input.cid {
        return Err(DecodeError::StatefulWithoutCid);
    }
    contexts
        .get(input.context_id)
        .map(|p| *p.octets())
        .ok_or(DecodeError::UnknownContext(input.context_id))
}

/// Rebuild a unicast address
pub(crate) fn decompress_unicast(
    input: &AddressInput<'_>,
    contexts: &ContextTable,
    is_source: bool,
) -> Result<Ipv6Addr, DecodeError> {
    let mut out = [0u8; 16];

    if input.am == 0 {
        if input.ac {
            if !is_source {
                return Err(DecodeError::ReservedAddressMode {
                    ac: true,
                    am: 0,
                    multicast: false,
                });
            }
            return Ok(Ipv6Addr::UNSPECIFIED);
        }
        out.copy_from_slice(input.inline);
        return Ok(Ipv6Addr::from(out));
    }

    if input.ac {
        out[..8].copy_from_slice(&context_prefix(input, contexts)?[..8]);
    } else {
        out[..8].copy_from_slice(&LINK_LOCAL_PREFIX);
    }

    match input.am {
        1 => out[8..].copy_from_slice(input.inline),
        2 => {
            out[8..14].copy_from_slice(&SHORT_ADDR_IID_PREFIX);
            out[14..].copy_from_slice(input.inline);
        }
        _ => {
            let iid = input.iid.ok_or(DecodeError::MissingLinkLayerAddress)?;
            out[8..].copy_from_slice(iid);
        }
    }
    Ok(Ipv6Addr::from(out))
}

/// Rebuild a multicast destination
pub(crate) fn decompress_multicast(
    input: &AddressInput<'_>,
    contexts: &ContextTable,
) -> Result<Ipv6Addr, DecodeError> {
    let i = input.inline;
    let mut out = [0u8; 16];
    out[0] = 0xff;

    match (input.ac, input.am) {
        (false, 0) => out.copy_from_slice(i),
        (false, 1) => {
            out[1] = i[0];
            out[11..].copy_from_slice(&i[1..]);
        }
        (false, 2) => {
            out[1] = i[0];
            out[13..].copy_from_slice(&i[1..]);
        }
        (false, _) => {
            out[1] = 0x02;
            out[15] = i[0];
        }
        (true, 0) => {
            let prefix = context_prefix(input, contexts)?;
            let length = contexts
                .get(input.context_id)
                .map_or(0, |p| p.length());
            out[1..3].copy_from_slice(&i[..2]);
            out[3] = length;
            out[4..12].copy_from_slice(&prefix[..8]);
            out[12..].copy_from_slice(&i[2..]);
        }
        (true, am) => {
            return Err(DecodeError::ReservedAddressMode {
                ac: true,
                am,
                multicast: true,
            })
        }
    }
    Ok(Ipv6Addr::from(out))
}
