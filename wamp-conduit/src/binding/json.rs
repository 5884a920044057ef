use crate::{
    binding::binding::{
        Binding,
        BindingError,
        BindingType,
        envelope_from_raw,
    },
    core::payload::Payload,
    message::envelope::Envelope,
};

/// A binding implemented for JavaScript Object Notation.
#[derive(Debug, Default)]
pub struct JsonBinding {}

impl<P> Binding<P> for JsonBinding
where
    P: Payload,
{
    fn binding_type(&self) -> BindingType {
        BindingType::Json
    }

    fn format(&self, envelope: &Envelope<P>) -> Result<Vec<u8>, BindingError> {
        serde_json::to_vec(envelope).map_err(|err| BindingError::Encoding(err.to_string()))
    }

    fn parse(&self, bytes: &[u8]) -> Result<Envelope<P>, BindingError> {
        envelope_from_raw(
            serde_json::from_slice(bytes).map_err(|err| BindingError::Decoding(err.to_string()))?,
        )
    }
}

#[cfg(test)]
mod json_test {
    use crate::{
        binding::{
            binding::{
                Binding,
                BindingError,
            },
            json::JsonBinding,
        },
        core::types::Value,
        message::envelope::{
            Envelope,
            MessageKind,
        },
    };

    #[test]
    fn formats_envelope_as_array() {
        let envelope = Envelope::new(
            MessageKind::Result,
            Vec::from_iter([
                Value::Integer(7),
                Value::Dictionary(Default::default()),
                Value::List(Vec::from_iter([Value::Integer(5)])),
            ]),
        );
        assert_eq!(
            Binding::<Value>::format(&JsonBinding::default(), &envelope).unwrap(),
            br#"[50,7,{},[5]]"#
        );
    }

    #[test]
    fn fails_parsing_unknown_kind() {
        assert_matches::assert_matches!(
            Binding::<Value>::parse(&JsonBinding::default(), br#"[99,1,{}]"#),
            Err(BindingError::UnknownMessageKind(99))
        );
    }

    #[test]
    fn fails_parsing_malformed_bytes() {
        let cases: [&[u8]; 5] = [
            br#"[48,1,{"#,
            br#"{"kind":48}"#,
            br#"["CALL",1]"#,
            br#"[48,1.5]"#,
            b"\xff\xfe",
        ];
        for bytes in cases {
            assert_matches::assert_matches!(
                Binding::<Value>::parse(&JsonBinding::default(), bytes),
                Err(BindingError::Decoding(_))
            );
        }
    }
}
