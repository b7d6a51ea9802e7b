//! Cryptographic conformance tests.
//!
//! Known-answer vectors for the primitives behind the handshake and the
//! message transform.

mod ecdh_p256_tests {
    use sealink_crypto::kex::EcdhP256KeyPair;

    fn uncompressed(x: &str, y: &str) -> Vec<u8> {
        let mut key = vec![0x04];
        key.extend(hex::decode(x).unwrap());
        key.extend(hex::decode(y).unwrap());
        key
    }

    /// RFC 5903 §8.1 (256-bit random ECP group).
    #[test]
    fn test_rfc5903_vector() {
        let initiator = EcdhP256KeyPair::from_private(
            &hex::decode("c88f01f510d9ac3f70a292daa2316de544e9aab8afe84049c62a9c57862d1433")
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            initiator.public_key(),
            uncompressed(
                "dad0b65394221cf9b051e1feca5787d098dfe637fc90b9ef945d0c3772581180",
                "5271a0461cdb8252d61f1c456fa3e59ab1f45b33accf5f58389e0577b8990bb3",
            )
            .as_slice()
        );

        let responder_public = uncompressed(
            "d12dfb5289c8d4f81208b70270398c342296970a0bccb74c736fc7554494bf63",
            "56fbf3ca366cc23e8157854c13c58d6aac23f046ada30f8353e74f33039872ab",
        );
        let shared = initiator.exchange(&responder_public).unwrap();
        assert_eq!(
            &shared[..],
            hex::decode("d6840f6b42f6edafd13116e0e12565202fef8e9ece7dce03812464d04b9442de")
                .unwrap()
                .as_slice()
        );
    }
}

mod transform_tests {
    use sealink_crypto::transform::{SEQUENCE_LEN, random_nonce, random_personalization};
    use sealink_crypto::{AeadProvider, TransformParams, TransformProvider};
    use zeroize::Zeroizing;

    fn params(secret: &[u8], nonce: &[u8], personalization: &str) -> TransformParams {
        TransformParams::new(
            Zeroizing::new(secret.to_vec()),
            Zeroizing::new(nonce.to_vec()),
            Zeroizing::new(personalization.to_string()),
        )
    }

    /// Two independent instantiations from the same triple interoperate.
    #[test]
    fn test_independent_instances_interoperate() {
        let provider = AeadProvider::new();
        provider.initialize().unwrap();

        let nonce = random_nonce();
        let personalization = random_personalization();
        let mut encoder = provider
            .encoder(params(&[7u8; 32], &nonce, &personalization))
            .unwrap();
        let mut decoder = provider
            .decoder(params(&[7u8; 32], &nonce, &personalization))
            .unwrap();

        for message in [&b""[..], &b"a"[..], &[0xAB; 4096][..]] {
            let encoded = encoder.encode(message).unwrap();
            assert!(encoded.len() >= SEQUENCE_LEN);
            assert_eq!(&decoder.decode(&encoded).unwrap()[..], message);
        }
    }

    /// Changing any one input produces an incompatible decoder.
    #[test]
    fn test_each_parameter_separates_sessions() {
        let provider = AeadProvider::new();
        let mut encoder = provider.encoder(params(&[1; 32], b"n", "p")).unwrap();
        let encoded = encoder.encode(b"payload").unwrap();

        for other in [
            params(&[2; 32], b"n", "p"),
            params(&[1; 32], b"m", "p"),
            params(&[1; 32], b"n", "q"),
        ] {
            let mut decoder = provider.decoder(other).unwrap();
            assert!(decoder.decode(&encoded).is_err());
        }
    }
}
