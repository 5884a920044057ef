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

/// A binding implemented for MessagePack.
#[derive(Debug, Default)]
pub struct MessagePackBinding {}

impl<P> Binding<P> for MessagePackBinding
where
    P: Payload,
{
    fn binding_type(&self) -> BindingType {
        BindingType::MessagePack
    }

    fn format(&self, envelope: &Envelope<P>) -> Result<Vec<u8>, BindingError> {
        rmp_serde::to_vec(envelope).map_err(|err| BindingError::Encoding(err.to_string()))
    }

    fn parse(&self, bytes: &[u8]) -> Result<Envelope<P>, BindingError> {
        envelope_from_raw(
            rmp_serde::from_slice(bytes).map_err(|err| BindingError::Decoding(err.to_string()))?,
        )
    }
}

#[cfg(test)]
mod message_pack_test {
    use crate::{
        binding::{
            binding::{
                Binding,
                BindingError,
            },
            message_pack::MessagePackBinding,
        },
        core::types::Value,
        message::envelope::{
            Envelope,
            MessageKind,
        },
    };

    #[test]
    fn formats_envelope_as_array() {
        let envelope = Envelope::new(MessageKind::Unregistered, Vec::from_iter([Value::Integer(1)]));
        // fixarray(2), positive fixint 67, positive fixint 1
        assert_eq!(
            Binding::<Value>::format(&MessagePackBinding::default(), &envelope).unwrap(),
            [0x92, 0x43, 0x01]
        );
    }

    #[test]
    fn fails_parsing_unknown_kind() {
        assert_matches::assert_matches!(
            Binding::<Value>::parse(&MessagePackBinding::default(), &[0x92, 0x05, 0x01]),
            Err(BindingError::UnknownMessageKind(5))
        );
    }

    #[test]
    fn fails_parsing_malformed_bytes() {
        // fixmap(1) instead of an array
        assert_matches::assert_matches!(
            Binding::<Value>::parse(&MessagePackBinding::default(), &[0x81, 0x01, 0x01]),
            Err(BindingError::Decoding(_))
        );
        // truncated array
        assert_matches::assert_matches!(
            Binding::<Value>::parse(&MessagePackBinding::default(), &[0x93, 0x30]),
            Err(BindingError::Decoding(_))
        );
    }
}
