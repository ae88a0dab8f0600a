use crate::error::RegistrationError;
use crate::types::registry::{TypeRegistration, TypeRegistry};
use crate::types::verifier::TensorVerifier;
use crate::types::{NativeType, ValueKind};

/// Batched RGB(A) image, `[batch, height, width, channels]`, values in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct ImageTensor;

/// Single-channel mask, `[batch, height, width]` or `[height, width]`, values in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct MaskTensor;

/// Latent-space tensor, `[batch, channels, height, width]`.
#[derive(Debug, Clone, Copy)]
pub struct LatentTensor;

impl NativeType for ImageTensor {
    const KIND: ValueKind = ValueKind::Object;
}

impl NativeType for MaskTensor {
    const KIND: ValueKind = ValueKind::Object;
}

impl NativeType for LatentTensor {
    const KIND: ValueKind = ValueKind::Object;
}

pub const INT: &str = "INT";
pub const FLOAT: &str = "FLOAT";
pub const STRING: &str = "STRING";
pub const BOOLEAN: &str = "BOOLEAN";
pub const IMAGE: &str = "IMAGE";
pub const MASK: &str = "MASK";
pub const LATENT: &str = "LATENT";

/// Registers the primitive and tensor port types every host understands.
pub fn register_builtin_types(types: &mut TypeRegistry) -> Result<(), RegistrationError> {
    types.register(TypeRegistration::of::<i64>().name(INT))?;
    types.register(TypeRegistration::of::<i32>().name(INT))?;
    types.register(TypeRegistration::of::<u32>().name(INT))?;
    types.register(TypeRegistration::of::<u64>().name(INT))?;
    types.register(TypeRegistration::of::<usize>().name(INT))?;
    types.register(TypeRegistration::of::<f64>().name(FLOAT))?;
    types.register(TypeRegistration::of::<f32>().name(FLOAT))?;
    types.register(TypeRegistration::of::<String>().name(STRING).auto_convert())?;
    types.register(TypeRegistration::of::<&'static str>().name(STRING).auto_convert())?;
    types.register(TypeRegistration::of::<bool>().name(BOOLEAN))?;

    types.register(
        TypeRegistration::of::<ImageTensor>()
            .name(IMAGE)
            .force_input()
            .verifier(TensorVerifier::new(IMAGE).ranks(&[4]).channels(&[1, 3, 4]).range(0.0, 1.0)),
    )?;
    types.register(
        TypeRegistration::of::<MaskTensor>()
            .name(MASK)
            .force_input()
            .verifier(TensorVerifier::new(MASK).ranks(&[2, 3]).range(0.0, 1.0)),
    )?;
    types.register(
        TypeRegistration::of::<LatentTensor>()
            .name(LATENT)
            .force_input()
            .verifier(TensorVerifier::new(LATENT).ranks(&[4])),
    )?;
    Ok(())
}
