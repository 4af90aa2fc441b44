use proptest::prelude::*;

use crate::{DType, Error, ShapeSpec, validate};

#[test]
fn test_try_new_valid() {
    let spec = ShapeSpec::try_new(&[2, 3], "float32").unwrap();
    assert_eq!(spec.dims(), &[2, 3]);
    assert_eq!(spec.dtype(), DType::Float32);
    assert_eq!(spec.numel(), 6);
    assert_eq!(spec.bytes(), 24);
    assert_eq!(spec.to_string(), "float32[2, 3]");
}

#[test]
fn test_try_new_negative_dimension() {
    let err = ShapeSpec::try_new(&[2, -1], "float32").unwrap_err();
    assert!(matches!(err, Error::NegativeDimension { axis: 1, dim: -1, .. }));
}

#[test]
fn test_try_new_unknown_dtype() {
    let err = ShapeSpec::try_new(&[4], "complex32").unwrap_err();
    assert!(matches!(err, Error::UnknownDType { .. }));
}

#[test]
fn test_try_new_overflow() {
    let err = ShapeSpec::try_new(&[i64::MAX, i64::MAX], "float64").unwrap_err();
    assert!(matches!(err, Error::ElementCountOverflow { .. }));
}

#[test]
fn test_scalar_spec() {
    let spec = ShapeSpec::scalar(DType::Float64);
    assert_eq!(spec.rank(), 0);
    assert_eq!(spec.numel(), 1);
    assert_eq!(spec.to_string(), "float64[]");
}

#[test]
fn test_validate_empty_list() {
    assert_eq!(validate(&[], true), Err(Error::EmptyShapeList));
    assert_eq!(validate(&[], false), Ok(()));
}

#[test]
fn test_zero_extent_is_valid() {
    let spec = ShapeSpec::try_new(&[0, 3], "int32").unwrap();
    assert_eq!(spec.numel(), 0);
    assert!(validate(&[spec], true).is_ok());
}

proptest! {
    #[test]
    fn valid_declarations_round_trip(dims in prop::collection::vec(0i64..16, 0..4), dtype in DType::any_generator()) {
        let spec = ShapeSpec::try_new(&dims, dtype.name()).unwrap();
        prop_assert_eq!(spec.dims().iter().map(|&d| d as i64).collect::<Vec<_>>(), dims);
        prop_assert_eq!(spec.dtype(), dtype);
        prop_assert!(validate(&[spec], true).is_ok());
    }
}
