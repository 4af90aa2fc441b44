use kernax_dtype::ShapeSpec;

/// A direct call of kernel source, as written at the call site.
///
/// ```ignore
/// let call = KernelCall::builder()
///     .source("void f(float& o, const float& x) { o = x * 2; }")
///     .out_shapes(vec![ShapeSpec::scalar(DType::Float32)])
///     .build();
/// let outs = bridge.kernel_call(&mut builder, &call, &[x])?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct KernelCall {
    #[builder(into)]
    pub source: String,
    #[builder(default = "f".to_owned(), into)]
    pub entry: String,
    /// Passed to the toolchain verbatim. Unset means the bridge's default flags.
    pub flags: Option<Vec<String>>,
    /// One result per declared shape, in order.
    pub out_shapes: Vec<ShapeSpec>,
}
