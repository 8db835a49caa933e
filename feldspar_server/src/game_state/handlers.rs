// Copyright 2023 drey7925
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;

/// Runs one unit of work on a shard or session worker. Errors get the handler name and origin
/// attached, and a panic is turned into an error so that the worker loop keeps going.
#[inline]
pub(crate) fn run_handler_impl<T, F>(
    closure: F,
    name: &str,
    origin: &dyn Display,
) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(closure)) {
        Ok(result) => result.map_err(|e| e.context(format!("{name} handler on {origin}"))),
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(anyhow!("{name} handler on {origin} panicked: {detail}"))
        }
    }
}

#[macro_export]
macro_rules! run_handler {
    ($closure:expr, $name:literal, $origin:expr $(,)?) => {{
        let _span = tracy_client::span!(concat!($name, " handler"));
        $crate::game_state::handlers::run_handler_impl($closure, $name, $origin)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_become_errors() {
        let result: anyhow::Result<()> = run_handler_impl(|| panic!("boom"), "test", &"shard");
        let message = result.unwrap_err().to_string();
        assert!(message.contains("panicked"));
        assert!(message.contains("boom"));
        assert_eq!(run_handler_impl(|| Ok(5), "test", &"shard").unwrap(), 5);
    }

    #[test]
    fn errors_carry_the_origin() {
        let result: anyhow::Result<()> =
            run_handler_impl(|| Err(anyhow!("bad slot")), "click", &"shard[0, 0]");
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("click handler on shard[0, 0]"));
        assert!(format!("{err:#}").contains("bad slot"));
    }
}
