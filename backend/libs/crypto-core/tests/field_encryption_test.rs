use crypto_core::{CryptoError, FieldCipher};
use serde_json::json;

fn cipher() -> FieldCipher {
    FieldCipher::new(&FieldCipher::generate_key()).expect("valid generated key")
}

#[test]
fn roundtrip_over_varied_plaintexts() {
    let cipher = cipher();

    let plaintexts = [
        "short",
        "a longer plaintext with spaces and punctuation!?",
        "unicode: ॐ मणिपद्मे हूँ",
        "",
    ];

    for plaintext in plaintexts {
        let packed = cipher.encrypt(plaintext).expect("encrypt");
        let recovered = cipher.decrypt(&packed).expect("decrypt");
        assert_eq!(recovered, plaintext, "failed for {:?}", plaintext);
    }
}

#[test]
fn malformed_inputs_fail_closed() {
    let cipher = cipher();
    let packed = cipher.encrypt("baseline").expect("encrypt");
    let parts: Vec<&str> = packed.split(':').collect();

    // Wrong segment count
    assert!(cipher.decrypt(parts[0]).is_err());
    assert!(cipher
        .decrypt(&format!("{}:{}", parts[0], parts[1]))
        .is_err());
    assert!(cipher
        .decrypt(&format!("{}:extra", packed))
        .is_err());

    // Truncated (odd-length) hex
    let truncated = format!("{}:{}:{}", &parts[0][..parts[0].len() - 1], parts[1], parts[2]);
    assert!(cipher.decrypt(&truncated).is_err());

    // Non-hex ciphertext
    let garbage = format!("zzzz:{}:{}", parts[1], parts[2]);
    assert!(cipher.decrypt(&garbage).is_err());

    // Flipped tag byte
    let mut tag = hex::decode(parts[2]).expect("tag hex");
    tag[3] ^= 0x01;
    let tampered = format!("{}:{}:{}", parts[0], parts[1], hex::encode(tag));
    assert!(matches!(
        cipher.decrypt(&tampered),
        Err(CryptoError::DecryptionFailed(_))
    ));
}

#[test]
fn field_transform_is_idempotent_on_decrypt() {
    let cipher = cipher();
    let record = json!({
        "id": "practitioner-7",
        "email": "seeker@example.com",
        "journal": "personal reflections",
        "streak": 21,
    });

    let stored = cipher
        .encrypt_fields(&record, &["email", "journal"])
        .expect("encrypt fields");
    assert_eq!(stored["email_encrypted"], json!(true));
    assert_eq!(stored["streak"], json!(21));

    let once = cipher
        .decrypt_fields(&stored, &["email", "journal"])
        .expect("decrypt fields");
    let twice = cipher
        .decrypt_fields(&once, &["email", "journal"])
        .expect("second decrypt is a no-op");

    assert_eq!(once, twice);
    assert_eq!(twice["email"], json!("seeker@example.com"));
    assert_eq!(twice["journal"], json!("personal reflections"));
}

#[test]
fn startup_rejects_bad_key_material() {
    assert!(matches!(
        FieldCipher::new("tooshort"),
        Err(CryptoError::InvalidKeyMaterial(_))
    ));
    assert!(matches!(
        FieldCipher::new(&"g".repeat(64)),
        Err(CryptoError::InvalidKeyMaterial(_))
    ));
    // 31 bytes of valid hex is still the wrong length
    assert!(matches!(
        FieldCipher::new(&"ab".repeat(31)),
        Err(CryptoError::InvalidKeyMaterial(_))
    ));
}
