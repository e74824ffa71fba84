//! The server-list wire encoder (C3, §4.3).
//!
//! Serialises a requesting peer's address, the requested field schema, and a
//! filtered sequence of [`GameServer`] records into the flat binary blob the
//! game client parses. Built with `cookie-factory`, the same combinator
//! library the rest of this workspace uses for wire serialisation.

use cookie_factory::bytes::{be_u16, be_u8};
use cookie_factory::combinator::{cond, slice, string};
use cookie_factory::multi::many_ref;
use cookie_factory::sequence::tuple;
use cookie_factory::{gen_simple, SerializeFn, WriteContext};
use std::io::Write;
use std::net::Ipv4Addr;

use crate::error::EncodingError;
use crate::schema;

/// The query port the client is told to default to absent an explicit one in
/// a record (§4.3): `0x1964` = 6500, the legacy BattleSpy default.
pub const DEFAULT_QUERY_PORT: u16 = 0x1964;

/// Record marker byte this core emits. `0x55` is tolerated on decode by
/// tooling elsewhere but never produced here (§9 open question, resolved).
pub const RECORD_MARKER: u8 = 0x51;

fn gen_field_name<'a, 'b: 'a, W: Write + 'a>(name: &'b String) -> impl SerializeFn<W> + 'a {
    tuple((string(name), be_u8(0x00), be_u8(0x00)))
}

fn gen_header<'a, 'b: 'a, W: Write + 'a>(
    client_ip: Ipv4Addr,
    fields: &'b [String],
) -> impl SerializeFn<W> + 'a {
    tuple((
        slice(client_ip.octets()),
        be_u16(DEFAULT_QUERY_PORT),
        be_u8(fields.len() as u8),
        be_u8(0x00),
        many_ref(fields, |name: &'b String| gen_field_name(name)),
    ))
}

/// One field-value slot inside a record: the rendered value, then a
/// separator `0x00 0xFF` if more fields follow.
fn gen_field_value<'a, 'b: 'a, W: Write + 'a>(
    value: &'b String,
    is_last: bool,
) -> impl SerializeFn<W> + 'a {
    tuple((string(value), cond(!is_last, tuple((be_u8(0x00), be_u8(0xFF))))))
}

fn gen_record<'a, 'b: 'a, W: Write + 'a>(
    ip: Ipv4Addr,
    query_port: u16,
    values: &'b [String],
) -> impl SerializeFn<W> + 'a {
    let last_index = values.len().saturating_sub(1);
    move |mut out: WriteContext<W>| {
        out = tuple((
            be_u8(RECORD_MARKER),
            slice(ip.octets()),
            be_u16(query_port),
            be_u8(0xFF),
        ))(out)?;
        for (i, value) in values.iter().enumerate() {
            out = gen_field_value(value, i == last_index)(out)?;
        }
        be_u8(0x00)(out)
    }
}

fn gen_terminator<W: Write>() -> impl SerializeFn<W> {
    tuple((be_u8(0x00), be_u8(0xFF), be_u8(0xFF), be_u8(0xFF), be_u8(0xFF)))
}

/// Encode the response blob for one query.
///
/// `client_ip` is the requesting peer's address (§4.3's header field);
/// `fields` is the client's requested field list in order (reflected back
/// verbatim, even for names outside the filterable schema, per §4.3);
/// `servers` is the already-filtered snapshot to emit records for.
pub fn encode(
    client_ip: Ipv4Addr,
    fields: &[String],
    servers: &[&schema::GameServer],
) -> Result<Vec<u8>, EncodingError> {
    if fields.len() > u8::MAX as usize {
        return Err(EncodingError::TooManyFields(fields.len()));
    }

    let mut buffer = Vec::new();
    buffer = gen_simple(gen_header(client_ip, fields), buffer)
        .map_err(|_| EncodingError::TooManyFields(fields.len()))?;

    for server in servers {
        let values: Vec<String> = fields
            .iter()
            .map(|name| schema::resolve(name, server).render())
            .collect();
        buffer = gen_simple(gen_record(server.ip, server.query_port, &values), buffer)
            .map_err(|_| EncodingError::TooManyFields(fields.len()))?;
    }

    buffer =
        gen_simple(gen_terminator(), buffer).map_err(|_| EncodingError::TooManyFields(fields.len()))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(ip: [u8; 4], query_port: u16, hostname: &str, num_players: u8) -> schema::GameServer {
        schema::GameServer {
            ip: Ipv4Addr::from(ip),
            query_port,
            game_port: query_port,
            hostname: hostname.to_string(),
            game_type: "gpm_cq".into(),
            map_name: "strike_at_karkand".into(),
            game_variant: "bf2".into(),
            num_players,
            max_players: 32,
            round_time: 900,
            connection_type: "LAN".into(),
            password_protected: false,
            ranked: true,
            punkbuster: true,
            dedicated: true,
            time_limit: 30,
            anticheat: true,
            last_refreshed: 1_700_000_000,
            is_validated: true,
            database_id: 1,
        }
    }

    #[test]
    fn header_round_trips_field_list() {
        let fields = vec!["hostname".to_string(), "numplayers".to_string()];
        let blob = encode(Ipv4Addr::new(9, 9, 9, 9), &fields, &[]).unwrap();

        assert_eq!(&blob[0..4], &[9, 9, 9, 9]);
        assert_eq!(u16::from_be_bytes([blob[4], blob[5]]), DEFAULT_QUERY_PORT);
        assert_eq!(blob[6], 2);
        assert_eq!(blob[7], 0x00);

        let mut rest = &blob[8..];
        for expected in &fields {
            let nul = rest.iter().position(|&b| b == 0x00).unwrap();
            assert_eq!(std::str::from_utf8(&rest[..nul]).unwrap(), expected);
            rest = &rest[nul + 2..];
        }
    }

    #[test]
    fn terminator_is_present_and_correct() {
        let fields = vec!["hostname".to_string()];
        let blob = encode(Ipv4Addr::new(1, 1, 1, 1), &fields, &[]).unwrap();
        assert_eq!(&blob[blob.len() - 5..], &[0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn record_uses_marker_and_field_separators() {
        let alpha = server([1, 2, 3, 4], 16567, "alpha", 8);
        let fields = vec!["hostname".to_string(), "numplayers".to_string()];
        let refs: Vec<&schema::GameServer> = vec![&alpha];
        let blob = encode(Ipv4Addr::new(0, 0, 0, 0), &fields, &refs).unwrap();

        let header_len = 8 + fields.iter().map(|f| f.len() + 2).sum::<usize>();
        let record = &blob[header_len..];

        assert_eq!(record[0], RECORD_MARKER);
        assert_eq!(&record[1..5], &[1, 2, 3, 4]);
        assert_eq!(u16::from_be_bytes([record[5], record[6]]), 16567);
        assert_eq!(record[7], 0xFF);
        assert_eq!(&record[8..13], b"alpha");
        assert_eq!(&record[13..15], &[0x00, 0xFF]);
        assert_eq!(&record[15..16], b"8");
        assert_eq!(record[16], 0x00);
    }

    #[test]
    fn unfilterable_field_name_reflects_back_empty() {
        let alpha = server([1, 2, 3, 4], 16567, "alpha", 8);
        let fields = vec!["sv_unknownflag".to_string()];
        let refs: Vec<&schema::GameServer> = vec![&alpha];
        let blob = encode(Ipv4Addr::new(0, 0, 0, 0), &fields, &refs).unwrap();

        let header_len = 8 + fields.iter().map(|f| f.len() + 2).sum::<usize>();
        let record = &blob[header_len..];
        // marker + ip + port + 0xFF, then immediately the end-of-record 0x00
        // because the value rendered empty.
        assert_eq!(record[8], 0x00);
    }

    #[test]
    fn encode_is_pure_over_its_inputs() {
        let alpha = server([1, 2, 3, 4], 16567, "alpha", 8);
        let fields = vec!["hostname".to_string()];
        let refs: Vec<&schema::GameServer> = vec![&alpha];

        let a = encode(Ipv4Addr::new(5, 5, 5, 5), &fields, &refs).unwrap();
        let b = encode(Ipv4Addr::new(5, 5, 5, 5), &fields, &refs).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn s1_two_servers_registry_order_with_requested_fields() {
        let alpha = server([1, 2, 3, 4], 16567, "alpha", 8);
        let beta = server([5, 6, 7, 8], 16567, "beta", 12);
        let fields = vec!["hostname".to_string(), "numplayers".to_string()];
        let refs: Vec<&schema::GameServer> = vec![&alpha, &beta];
        let blob = encode(Ipv4Addr::new(1, 1, 1, 1), &fields, &refs).unwrap();

        assert_eq!(blob[6], 2);
        let alpha_pos = blob.windows(5).position(|w| w == [1, 2, 3, 4]).unwrap();
        let beta_pos = blob.windows(5).position(|w| w == [5, 6, 7, 8]).unwrap();
        assert!(alpha_pos < beta_pos);
        assert_eq!(&blob[blob.len() - 5..], &[0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
    }
}
