use digest_core::blob::*;
use digest_core::hash::SessionKey;
use digest_core::types::*;

fn sample_request() -> PassthroughRequest {
    PassthroughRequest {
        flags: 0,
        flavor: Flavor::Sasl,
        algorithm: Algorithm::Md5Sess,
        qop: Some(Qop::AuthConf),
        cipher: Some(Cipher::TripleDes),
        charset: Charset::Utf8,
        username: b"chris".to_vec(),
        realm: b"elwood.innosoft.com".to_vec(),
        nonce: b"OA6MG9tEQGm2hh".to_vec(),
        cnonce: b"OA6MHXh6VqTrRk".to_vec(),
        nc: b"00000001".to_vec(),
        method: SASL_METHOD.as_bytes().to_vec(),
        uri: b"imap/elwood.innosoft.com".to_vec(),
        entity_hash: Some(ZERO_ENTITY_HASH.as_bytes().to_vec()),
        authzid: None,
        response: b"d388dad90d4bbd760a152321f2143af7".to_vec(),
        domain: b"INNOSOFT".to_vec(),
    }
}

#[test]
fn request_survives_encoding() {
    let request = sample_request();
    let decoded = decode_request(&encode_request(&request).unwrap()).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn local_lookup_marker_is_stripped_on_the_wire() {
    let mut request = sample_request();
    request.flags = FLAG_FORWARDED | FLAG_LOCAL_LOOKUP_DONE;
    let decoded = decode_request(&encode_request(&request).unwrap()).unwrap();
    assert_eq!(decoded.flags, FLAG_FORWARDED);
}

#[test]
fn unknown_flag_bits_are_rejected() {
    let mut blob = encode_request(&sample_request()).unwrap();
    blob[6] = 0x80;
    assert_eq!(decode_request(&blob), Err(DigestError::MalformedMessage));
}

#[test]
fn bad_magic_or_version_is_rejected() {
    let good = encode_request(&sample_request()).unwrap();
    let mut bad_magic = good.clone();
    bad_magic[0] = b'X';
    assert!(decode_request(&bad_magic).is_err());
    let mut bad_version = good.clone();
    bad_version[4] = BLOB_VERSION + 1;
    assert!(decode_request(&bad_version).is_err());
    assert!(decode_reply(&good).is_err());
}

#[test]
fn truncated_and_trailing_bytes_are_rejected() {
    let good = encode_request(&sample_request()).unwrap();
    assert!(decode_request(&good[..good.len() - 1]).is_err());
    let mut trailing = good.clone();
    trailing.push(0);
    assert!(decode_request(&trailing).is_err());
}

#[test]
fn duplicate_record_is_rejected() {
    let mut blob = encode_request(&sample_request()).unwrap();
    blob.extend_from_slice(&[1, 0, 1, b'x']);
    assert!(decode_request(&blob).is_err());
}

#[test]
fn oversized_field_fails_to_encode() {
    let mut request = sample_request();
    request.username = vec![b'a'; MAX_TOKEN_LENGTH + 1];
    assert_eq!(encode_request(&request), Err(DigestError::Internal));
}

#[test]
fn success_reply_round_trip() {
    let reply = PassthroughReply::success(
        b"chris".to_vec(),
        b"INNOSOFT".to_vec(),
        SessionKey::from_bytes([7u8; MD5_HASH_LENGTH]),
        vec![1, 2, 3, 4],
    );
    let decoded = decode_reply(&encode_reply(&reply).unwrap()).unwrap();
    assert_eq!(decoded, reply);
    decoded.check_status().unwrap();
}

#[test]
fn failure_reply_carries_status() {
    let reply = PassthroughReply::failure(DigestError::AuthenticationFailed);
    let decoded = decode_reply(&encode_reply(&reply).unwrap()).unwrap();
    assert_eq!(decoded.check_status(), Err(DigestError::AuthenticationFailed));
    assert!(decoded.session_key.is_none());
}

#[test]
fn success_reply_without_key_is_malformed() {
    let mut reply = PassthroughReply::failure(DigestError::Internal);
    reply.status = 0;
    let blob = encode_reply(&reply).unwrap();
    assert_eq!(decode_reply(&blob), Err(DigestError::MalformedMessage));
}
