//! C++ prelude and the fixed kernel ABI adapter.
//!
//! A native build compiles `prelude + user source + adapter` as one
//! translation unit. The adapter is the only exported symbol:
//!
//! ```c
//! extern "C" void kernax_adapter_<key>(void** outs, void** ins);
//! ```
//!
//! It reinterprets each raw row-major buffer as `kernax::tensor<elem, dims...>`
//! and calls the entry point with all outputs followed by all inputs.

use std::fmt::Write;

use kernax_dtype::ShapeSpec;

use crate::render::tensor_type;

/// Definitions of `kernax::tensor` and `kernax::tape` plus the math functions kernels may call unqualified.
pub const PRELUDE: &str = r#"#include <cmath>
#include <cstddef>
#include <vector>

namespace kernax {

template <typename T, std::size_t... Dims>
struct tensor;

template <typename T>
struct tensor<T> {
    T value;

    operator T() const { return value; }
    tensor& operator=(T v) { value = v; return *this; }
    tensor& operator+=(T v) { value += v; return *this; }
    tensor& operator-=(T v) { value -= v; return *this; }
    tensor& operator*=(T v) { value *= v; return *this; }
    tensor& operator/=(T v) { value /= v; return *this; }
    tensor& operator%=(T v) { value %= v; return *this; }
    tensor& operator++() { ++value; return *this; }
    tensor& operator--() { --value; return *this; }
    T operator++(int) { return value++; }
    T operator--(int) { return value--; }
};

template <typename T, std::size_t N, std::size_t... Rest>
struct tensor<T, N, Rest...> {
    tensor<T, Rest...> data[N];

    tensor<T, Rest...>& operator[](std::size_t i) { return data[i]; }
    const tensor<T, Rest...>& operator[](std::size_t i) const { return data[i]; }

    tensor& operator=(T v) { for (auto& d : data) d = v; return *this; }
    tensor& operator+=(T v) { for (auto& d : data) d += v; return *this; }
    tensor& operator-=(T v) { for (auto& d : data) d -= v; return *this; }
    tensor& operator*=(T v) { for (auto& d : data) d *= v; return *this; }
    tensor& operator/=(T v) { for (auto& d : data) d /= v; return *this; }
    tensor& operator+=(const tensor& o) { for (std::size_t i = 0; i < N; ++i) data[i] += o.data[i]; return *this; }
    tensor& operator-=(const tensor& o) { for (std::size_t i = 0; i < N; ++i) data[i] -= o.data[i]; return *this; }
    tensor& operator*=(const tensor& o) { for (std::size_t i = 0; i < N; ++i) data[i] *= o.data[i]; return *this; }
    tensor& operator/=(const tensor& o) { for (std::size_t i = 0; i < N; ++i) data[i] /= o.data[i]; return *this; }
};

struct tape {
    std::vector<double> values;

    void push(double v) { values.push_back(v); }
    double pop() { double v = values.back(); values.pop_back(); return v; }
};

}  // namespace kernax

using std::abs;
using std::ceil;
using std::cos;
using std::erf;
using std::exp;
using std::fabs;
using std::floor;
using std::fmax;
using std::fmin;
using std::fmod;
using std::log;
using std::pow;
using std::sin;
using std::sqrt;
using std::tan;
using std::tanh;
"#;

/// Exported symbol name of the adapter for a content key.
pub fn adapter_symbol(key: u64) -> String {
    format!("kernax_adapter_{key:016x}")
}

/// Full translation unit handed to the native compiler.
pub fn translation_unit(
    user_source: &str,
    entry: &str,
    symbol: &str,
    outputs: &[ShapeSpec],
    inputs: &[ShapeSpec],
) -> String {
    let mut unit = String::with_capacity(PRELUDE.len() + user_source.len() + 512);
    unit.push_str(PRELUDE);
    unit.push_str("\n#line 1 \"kernel.cpp\"\n");
    unit.push_str(user_source);
    if !user_source.ends_with('\n') {
        unit.push('\n');
    }

    let _ = writeln!(unit, "\n#line 1 \"kernax_adapter.cpp\"");
    let _ = writeln!(unit, "extern \"C\" void {symbol}(void** outs, void** ins) {{");
    let mut args = Vec::with_capacity(outputs.len() + inputs.len());
    for (i, spec) in outputs.iter().enumerate() {
        args.push(format!("*static_cast<{}*>(outs[{i}])", tensor_type(spec)));
    }
    for (i, spec) in inputs.iter().enumerate() {
        args.push(format!("*static_cast<const {}*>(ins[{i}])", tensor_type(spec)));
    }
    let _ = writeln!(unit, "    {entry}({});", args.join(", "));
    unit.push_str("}\n");
    unit
}
