use kernax_dtype::DType;

use crate::ast::{DimExpr, ExprKind, StmtKind, TemplateParam, TypeExpr};
use crate::parser::parse;
use crate::preprocess::preprocess;
use crate::test::{FILL, MYFN};

fn parse_src(src: &str) -> crate::Result<crate::ast::TranslationUnit> {
    parse(preprocess(src, &[])?)
}

#[test]
fn test_parse_templated_kernel() {
    let unit = parse_src(MYFN).unwrap();
    let f = unit.function("myfn").unwrap();
    assert_eq!(
        f.template,
        vec![
            TemplateParam::Value { name: "N".into(), dtype: DType::Int64, pos: f.template[0].pos() },
            TemplateParam::Value { name: "M".into(), dtype: DType::Int64, pos: f.template[1].pos() },
        ]
    );
    assert_eq!(f.params.len(), 3);
    assert!(!f.params[0].is_const && f.params[0].is_ref);
    assert!(f.params[2].is_const);
    assert_eq!(
        f.params[2].ty,
        TypeExpr::Tensor {
            elem: Box::new(TypeExpr::Scalar(DType::Float32)),
            dims: vec![DimExpr::Param("N".into()), DimExpr::Param("M".into())],
        }
    );
    assert_eq!(f.body.len(), 2);
    assert!(matches!(f.body[0].kind, StmtKind::For { .. }));
}

#[test]
fn test_parse_typename_params() {
    let unit = parse_src(FILL).unwrap();
    let f = unit.function("f").unwrap();
    assert_eq!(f.params[0].ty, TypeExpr::Named("T1".into()));
    let StmtKind::Expr(e) = &f.body[0].kind else { panic!("expected expression statement") };
    assert!(matches!(&e.kind, ExprKind::Assign { op: None, .. }));
}

#[test]
fn test_precedence_and_casts() {
    let src = "void g(float& o, const float& x) { o = (float)x + 2 * x - static_cast<double>(x) / float(3); }";
    let unit = parse_src(src).unwrap();
    let StmtKind::Expr(e) = &unit.functions[0].body[0].kind else { panic!() };
    let ExprKind::Assign { value, .. } = &e.kind else { panic!() };
    // ((cast + (2 * x)) - (cast / cast))
    let ExprKind::Binary { op, lhs, rhs } = &value.kind else { panic!() };
    assert_eq!(*op, crate::kir::BinaryOp::Sub);
    assert!(matches!(&lhs.kind, ExprKind::Binary { op: crate::kir::BinaryOp::Add, .. }));
    assert!(matches!(&rhs.kind, ExprKind::Binary { op: crate::kir::BinaryOp::Div, .. }));
}

#[test]
fn test_missing_semicolon_reports_position() {
    let err = parse_src("void g(float& o) {\n  o = 1.0f\n}\n").unwrap_err();
    assert_eq!(err.to_string(), "kernel.cpp:3:1: error: expected ';' before '}'");
}

#[test]
fn test_non_void_function_rejected() {
    let err = parse_src("float g(float& o) { }").unwrap_err();
    assert!(err.to_string().contains("must return 'void'"), "{err}");
}

#[test]
fn test_unsupported_statement() {
    let err = parse_src("void g(float& o) { for (;;) { break; } }").unwrap_err();
    assert!(err.to_string().contains("'break' is not supported"), "{err}");
}

#[test]
fn test_empty_unit_rejected() {
    assert!(parse_src("// nothing here\n").is_err());
}
