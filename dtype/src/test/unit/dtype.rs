use test_case::test_case;

use crate::{DType, Error};

#[test_case("float32", DType::Float32)]
#[test_case("f32", DType::Float32)]
#[test_case("float", DType::Float32)]
#[test_case("Float64", DType::Float64)]
#[test_case("double", DType::Float64)]
#[test_case("i32", DType::Int32)]
#[test_case("long", DType::Int64)]
#[test_case(" bool ", DType::Bool)]
fn test_parse_dtype(name: &str, expected: DType) {
    assert_eq!(name.parse::<DType>().unwrap(), expected);
}

#[test]
fn test_parse_unknown_dtype() {
    let err = "float8".parse::<DType>().unwrap_err();
    assert_eq!(err, Error::UnknownDType { name: "float8".to_string() });
}

#[test]
fn test_c_style_round_trip() {
    use strum::IntoEnumIterator;
    for dtype in DType::iter() {
        assert_eq!(DType::from_c_style(dtype.c_style()), Some(dtype));
    }
}

#[test]
fn test_promote() {
    assert_eq!(DType::promote(DType::Int32, DType::Float32), DType::Float32);
    assert_eq!(DType::promote(DType::Float64, DType::Float32), DType::Float64);
    assert_eq!(DType::promote(DType::Bool, DType::Bool), DType::Int32);
    assert_eq!(DType::promote(DType::Int64, DType::Int32), DType::Int64);
}
