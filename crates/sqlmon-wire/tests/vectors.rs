use sqlmon_wire::routing::{decode_route, encode_route};

// Known-good metadata frames: route string -> expected hex bytes on the wire.
const VECTORS: &[(&str, &str)] = &[
    ("qps/3", "057170732f33"),
    ("connection-usage/3", "12636f6e6e656374696f6e2d75736167652f33"),
    ("cache-hit-rate/5", "1063616368652d6869742d726174652f35"),
    (
        "network-traffic/KB/3",
        "146e6574776f726b2d747261666669632f4b422f33",
    ),
    ("network-traffic/GB/60", "156e6574776f726b2d747261666669632f47422f3630"),
];

#[test]
fn vectors_match_route_encoding() {
    for (route, frame_hex) in VECTORS {
        let expected = hex_to_bytes(frame_hex);
        let encoded = encode_route(route).expect("encode");
        assert_eq!(
            encoded.as_ref(),
            expected.as_slice(),
            "frame mismatch for {route:?}"
        );

        let decoded = decode_route(&expected).expect("decode");
        assert_eq!(&decoded, route, "round trip mismatch for {route:?}");
    }
}

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "hex length must be even");
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = from_hex_char(pair[0]) << 4;
            let lo = from_hex_char(pair[1]);
            hi | lo
        })
        .collect()
}

fn from_hex_char(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex char"),
    }
}
