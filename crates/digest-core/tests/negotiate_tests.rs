use digest_core::negotiate::*;
use digest_core::types::*;

const ALL_QOPS: &[u8] = b"auth,auth-int,auth-conf";

#[test]
fn confidentiality_always_selects_auth_conf() {
    for flavor in [Flavor::Http, Flavor::Sasl] {
        assert_eq!(
            select_qop(Some(ALL_QOPS), flavor, true, false).unwrap(),
            Some(Qop::AuthConf)
        );
        assert_eq!(
            select_qop(Some(ALL_QOPS), flavor, true, true).unwrap(),
            Some(Qop::AuthConf)
        );
    }
}

#[test]
fn integrity_requires_auth_int() {
    assert_eq!(
        select_qop(Some(ALL_QOPS), Flavor::Sasl, false, true).unwrap(),
        Some(Qop::AuthInt)
    );
    assert_eq!(
        select_qop(Some(&b"auth"[..]), Flavor::Sasl, false, true),
        Err(DigestError::Unsupported)
    );
}

#[test]
fn plain_request_takes_auth() {
    assert_eq!(
        select_qop(Some(ALL_QOPS), Flavor::Http, false, false).unwrap(),
        Some(Qop::Auth)
    );
    assert_eq!(
        select_qop(Some(&b"auth-int"[..]), Flavor::Http, false, false),
        Err(DigestError::Unsupported)
    );
}

#[test]
fn absent_qop_means_legacy_for_http_and_auth_for_sasl() {
    assert_eq!(select_qop(None, Flavor::Http, false, false).unwrap(), None);
    assert_eq!(
        select_qop(None, Flavor::Sasl, false, false).unwrap(),
        Some(Qop::Auth)
    );
    assert_eq!(
        select_qop(None, Flavor::Sasl, true, false),
        Err(DigestError::Unsupported)
    );
}

#[test]
fn algorithm_selection_per_flavor() {
    assert_eq!(select_algorithm(Some(&b"md5"[..]), Flavor::Sasl), Err(DigestError::Unsupported));
    assert_eq!(select_algorithm(None, Flavor::Sasl), Err(DigestError::Unsupported));
    assert_eq!(
        select_algorithm(Some(&b"md5-sess"[..]), Flavor::Sasl).unwrap(),
        Algorithm::Md5Sess
    );
    assert_eq!(select_algorithm(None, Flavor::Http).unwrap(), Algorithm::Md5);
    assert_eq!(select_algorithm(Some(&b"MD5"[..]), Flavor::Http).unwrap(), Algorithm::Md5);
    assert_eq!(
        select_algorithm(Some(&b"MD5,MD5-sess"[..]), Flavor::Http).unwrap(),
        Algorithm::Md5Sess
    );
    assert_eq!(
        select_algorithm(Some(&b"SHA-256"[..]), Flavor::Http),
        Err(DigestError::Unsupported)
    );
}

#[test]
fn cipher_preference_order() {
    assert_eq!(select_cipher(Some(&b"des,3des,rc4"[..])).unwrap(), Cipher::Rc4);
    assert_eq!(select_cipher(Some(&b"des,rc4-40"[..])).unwrap(), Cipher::Rc4_40);
    assert_eq!(select_cipher(Some(&b"aes-cbc"[..])), Err(DigestError::Unsupported));
    assert_eq!(select_cipher(None), Err(DigestError::Unsupported));
}

#[test]
fn charset_needs_offer_and_policy() {
    assert_eq!(select_charset(Some(&b"utf-8"[..]), true), Charset::Utf8);
    assert_eq!(select_charset(Some(&b"utf-8"[..]), false), Charset::Iso8859_1);
    assert_eq!(select_charset(None, true), Charset::Iso8859_1);
}

#[test]
fn maxbuf_takes_smaller_value() {
    assert_eq!(select_maxbuf(Some(4096), DEFAULT_MAXBUF), 4096);
    assert_eq!(select_maxbuf(Some(MAX_MAXBUF), DEFAULT_MAXBUF), DEFAULT_MAXBUF);
    assert_eq!(select_maxbuf(None, 1024), 1024);
}

#[test]
fn acceptor_checks_echoed_algorithm() {
    assert_eq!(
        accept_algorithm(None, Flavor::Sasl, Algorithm::Md5Sess).unwrap(),
        Algorithm::Md5Sess
    );
    assert_eq!(
        accept_algorithm(None, Flavor::Http, Algorithm::Md5).unwrap(),
        Algorithm::Md5
    );
    assert_eq!(
        accept_algorithm(None, Flavor::Http, Algorithm::Md5Sess),
        Err(DigestError::Unsupported)
    );
    assert_eq!(
        accept_algorithm(Some(&b"MD5"[..]), Flavor::Http, Algorithm::Md5Sess),
        Err(DigestError::Unsupported)
    );
}

#[test]
fn acceptor_checks_chosen_qop_and_cipher() {
    let offered = [Qop::Auth, Qop::AuthInt];
    assert_eq!(accept_qop(None, Flavor::Http, &offered).unwrap(), None);
    assert_eq!(
        accept_qop(None, Flavor::Sasl, &offered).unwrap(),
        Some(Qop::Auth)
    );
    assert_eq!(
        accept_qop(Some(&b"auth-conf"[..]), Flavor::Sasl, &offered),
        Err(DigestError::Unsupported)
    );
    assert_eq!(
        accept_cipher(Some(&b"3des"[..]), &[Cipher::Rc4, Cipher::TripleDes]).unwrap(),
        Cipher::TripleDes
    );
    assert_eq!(accept_cipher(None, &Cipher::PREFERENCE), Err(DigestError::Unsupported));
}
