// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the ADGEN project (Algorithmic Differentiation code GENeration).

use super::{
    ModelSource, GET_THREADS_SYMBOL, MODELS_SYMBOL, ON_CLOSE_SYMBOL, SET_THREADS_SYMBOL,
    VERSION_SYMBOL,
};

/// C header declaring the library ABI and every model entry point.
pub fn generate_header(
    library: &str,
    models: &[ModelSource],
    on_close: bool,
    thread_pool: bool,
) -> String {
    let guard = format!("{}_H", library.to_ascii_uppercase());
    let mut decls = vec![
        format!("uint64_t {VERSION_SYMBOL}(void);"),
        format!("void {MODELS_SYMBOL}(const char* const** names, uint64_t* count);"),
    ];
    if on_close {
        decls.push(format!("void {ON_CLOSE_SYMBOL}(void);"));
    }
    if thread_pool {
        decls.push(format!("void {SET_THREADS_SYMBOL}(uint64_t n);"));
        decls.push(format!("uint64_t {GET_THREADS_SYMBOL}(void);"));
    }
    for model in models {
        decls.push(String::new());
        decls.extend(model.prototypes());
    }

    format!(
        r#"#ifndef {guard}
#define {guard}
#include <stdint.h>
#ifdef __cplusplus
extern "C" {{
#endif

{}

#ifdef __cplusplus
}} // extern "C"
#endif
#endif
"#,
        decls.join("\n")
    )
}
