//! Host closures callable from guest code
//!
//! A [`HostFunction`] carries one or more [`Overload`]s. When a guest executes
//! it, the overload is chosen like a host compiler would:
//!
//! 1. overloads whose arity cannot match are dropped; if none remain the call
//!    fails with an arity error spanning all overloads
//! 2. for each priority from `Strict` to `HostProxy`, fixed-arity candidates
//!    are tried before variable-arity ones; a candidate applies when every
//!    argument converts to its parameter at that priority
//! 3. among several applicable candidates the most specific one wins: per
//!    argument, a parameter the argument converts to at a stricter priority
//!    beats one it converts to only later, then a narrower type beats a wider
//!    one. Conflicting verdicts make the call ambiguous.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tandem_sdk::{ForeignObject, GuestValue, HostException, InteropError, InteropResult};
use tracing::debug;

use crate::context::Context;
use crate::error::PolyglotResult;
use crate::host_value::{HostArray, HostValue};
use crate::to_guest::{to_guest, HOST_LANGUAGE};
use crate::to_host::{can_convert, to_host, Priority};
use crate::types::HostType;

/// Body of a host overload, called with arguments converted to its parameters
pub type HostBody = dyn Fn(&Context, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync;

/// One typed signature of a host function
#[derive(Clone)]
pub struct Overload {
    params: Vec<HostType>,
    varargs: bool,
    body: Arc<HostBody>,
}

impl Overload {
    pub fn new<F>(params: Vec<HostType>, body: F) -> Self
    where
        F: Fn(&Context, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync + 'static,
    {
        Overload {
            params,
            varargs: false,
            body: Arc::new(body),
        }
    }

    /// An overload whose last parameter, an array type, takes any number of
    /// trailing arguments
    pub fn varargs<F>(params: Vec<HostType>, body: F) -> Self
    where
        F: Fn(&Context, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync + 'static,
    {
        let varargs = params.last().and_then(HostType::component).is_some();
        Overload {
            varargs,
            ..Overload::new(params, body)
        }
    }

    pub fn params(&self) -> &[HostType] {
        &self.params
    }

    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    /// Parameter type for argument `index`; trailing arguments of a
    /// variable-arity call take the array's component type
    fn param_type(&self, index: usize, spread: bool) -> HostType {
        if spread && index + 1 >= self.params.len() {
            return self
                .params
                .last()
                .and_then(HostType::component)
                .unwrap_or_else(HostType::object);
        }
        self.params.get(index).cloned().unwrap_or_else(HostType::object)
    }

    fn accepts_arity(&self, count: usize) -> bool {
        if self.varargs {
            count + 1 >= self.params.len()
        } else {
            count == self.params.len()
        }
    }
}

impl fmt::Display for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        if self.varargs {
            if let (Some(last), Some(component)) =
                (parts.last_mut(), self.params.last().and_then(HostType::component))
            {
                *last = format!("{}...", component);
            }
        }
        write!(f, "({})", parts.join(", "))
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Overload{}", self)
    }
}

/// A host function exposed to the guests of one context.
pub struct HostFunction {
    name: String,
    context: Context,
    overloads: Vec<Overload>,
}

/// Builder for [`HostFunction`]
pub struct HostFunctionBuilder {
    name: String,
    overloads: Vec<Overload>,
}

impl HostFunctionBuilder {
    pub fn overload<F>(mut self, params: Vec<HostType>, body: F) -> Self
    where
        F: Fn(&Context, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync + 'static,
    {
        self.overloads.push(Overload::new(params, body));
        self
    }

    pub fn varargs_overload<F>(mut self, params: Vec<HostType>, body: F) -> Self
    where
        F: Fn(&Context, &[HostValue]) -> PolyglotResult<HostValue> + Send + Sync + 'static,
    {
        self.overloads.push(Overload::varargs(params, body));
        self
    }

    /// Finish the function for guests of `context`
    pub fn build(self, context: &Context) -> HostFunction {
        HostFunction {
            name: self.name,
            context: context.clone(),
            overloads: self.overloads,
        }
    }
}

impl HostFunction {
    pub fn builder(name: impl Into<String>) -> HostFunctionBuilder {
        HostFunctionBuilder {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overloads(&self) -> &[Overload] {
        &self.overloads
    }

    /// Pick the overload for `args`; the flag tells whether trailing
    /// arguments are collected into the variable-arity array
    pub fn select(&self, args: &[GuestValue]) -> InteropResult<(&Overload, bool)> {
        let mut applicable = Vec::new();
        let mut min_arity = usize::MAX;
        let mut max_arity = 0;
        let mut any_varargs = false;
        for overload in &self.overloads {
            any_varargs |= overload.varargs;
            if overload.accepts_arity(args.len()) {
                applicable.push(overload);
            } else {
                let fixed = if overload.varargs {
                    overload.params.len() - 1
                } else {
                    overload.params.len()
                };
                min_arity = min_arity.min(fixed);
                max_arity = max_arity.max(fixed);
            }
        }
        if applicable.is_empty() {
            return Err(InteropError::arity(
                if min_arity == usize::MAX { 0 } else { min_arity },
                if any_varargs { None } else { Some(max_arity) },
                args.len(),
            ));
        }

        for priority in Priority::ALL {
            if let Some(best) = self.best_candidate(&applicable, args, false, priority)? {
                debug!(function = %self.name, overload = %best, %priority, "overload selected");
                return Ok((best, false));
            }
            if any_varargs {
                if let Some(best) = self.best_candidate(&applicable, args, true, priority)? {
                    debug!(function = %self.name, overload = %best, %priority, "varargs overload selected");
                    return Ok((best, true));
                }
            }
        }
        Err(InteropError::unsupported_type(
            format!(
                "no applicable overload found (overloads: {}, arguments: {})",
                render_overloads(&self.overloads),
                self.render_arguments(args)
            ),
            args.to_vec(),
        ))
    }

    fn best_candidate<'a>(
        &self,
        applicable: &[&'a Overload],
        args: &[GuestValue],
        spread: bool,
        priority: Priority,
    ) -> InteropResult<Option<&'a Overload>> {
        let candidates: Vec<&Overload> = applicable
            .iter()
            .copied()
            .filter(|overload| {
                if spread {
                    overload.varargs
                } else {
                    !overload.varargs || overload.params.len() == args.len()
                }
            })
            .filter(|overload| {
                args.iter().enumerate().all(|(i, arg)| {
                    can_convert(&self.context, arg, &overload.param_type(i, spread), priority)
                })
            })
            .collect();
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(Some(candidates[0])),
            _ => match self.most_specific(&candidates, args, spread, priority) {
                Some(best) => Ok(Some(best)),
                None => Err(InteropError::unsupported_type(
                    format!(
                        "Multiple applicable overloads found for method name {} (candidates: {}, arguments: {})",
                        self.name,
                        render_overloads(candidates.iter().copied()),
                        self.render_arguments(args)
                    ),
                    args.to_vec(),
                )),
            },
        }
    }

    fn most_specific<'a>(
        &self,
        candidates: &[&'a Overload],
        args: &[GuestValue],
        spread: bool,
        priority: Priority,
    ) -> Option<&'a Overload> {
        let mut best: Vec<&Overload> = vec![candidates[0]];
        for candidate in candidates[1..].iter().copied() {
            let mut add = false;
            best.retain(|current| match self.compare(candidate, current, args, spread, priority) {
                0 => {
                    add = true;
                    true
                }
                r if r < 0 => {
                    add = true;
                    false
                }
                _ => true,
            });
            if add {
                best.push(candidate);
            }
        }
        match best.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Negative when `a` is more specific than `b` for `args`, positive when
    /// less, zero when undecided
    fn compare(&self, a: &Overload, b: &Overload, args: &[GuestValue], spread: bool, priority: Priority) -> i32 {
        let mut verdict = 0;
        for (i, arg) in args.iter().enumerate() {
            let t1 = a.param_type(i, spread);
            let t2 = b.param_type(i, spread);
            if t1 == t2 {
                continue;
            }
            let mut r = self.compare_by_priority(&t1, &t2, arg, priority);
            if r == 0 {
                r = compare_assignable(&t1, &t2);
                if r == 0 {
                    continue;
                }
            }
            if verdict == 0 {
                verdict = r;
            } else if verdict != r {
                return 0;
            }
        }
        verdict
    }

    fn compare_by_priority(&self, t1: &HostType, t2: &HostType, arg: &GuestValue, priority: Priority) -> i32 {
        if priority <= Priority::Strict {
            return 0;
        }
        for level in Priority::ALL.iter().take_while(|p| **p <= priority) {
            let p1 = can_convert(&self.context, arg, t1, *level);
            let p2 = can_convert(&self.context, arg, t2, *level);
            if p1 != p2 {
                return if p1 { -1 } else { 1 };
            }
        }
        0
    }

    fn render_arguments(&self, args: &[GuestValue]) -> String {
        let parts: Vec<String> = args.iter().map(|a| self.context.value_info(a)).collect();
        format!("[{}]", parts.join(", "))
    }

    /// Convert guest arguments for `overload`, packing trailing arguments
    /// into the variable-arity array when `spread` is set
    fn convert_arguments(
        &self,
        overload: &Overload,
        args: &[GuestValue],
        spread: bool,
    ) -> PolyglotResult<Vec<HostValue>> {
        let convert = |arg: &GuestValue, ty: &HostType| to_host(&self.context, arg, ty, Priority::HostProxy);
        if !spread {
            return args
                .iter()
                .zip(&overload.params)
                .map(|(arg, ty)| convert(arg, ty))
                .collect();
        }
        let fixed = overload.params.len() - 1;
        let mut converted = args[..fixed]
            .iter()
            .zip(&overload.params)
            .map(|(arg, ty)| convert(arg, ty))
            .collect::<PolyglotResult<Vec<_>>>()?;
        let component = overload.param_type(fixed, true);
        let trailing = args[fixed..]
            .iter()
            .map(|arg| convert(arg, &component))
            .collect::<PolyglotResult<Vec<_>>>()?;
        converted.push(HostValue::Array(HostArray::new(component, trailing)));
        Ok(converted)
    }
}

fn compare_assignable(t1: &HostType, t2: &HostType) -> i32 {
    if t1.class().is_assignable_from(t2.class()) {
        1
    } else if t2.class().is_assignable_from(t1.class()) {
        -1
    } else {
        0
    }
}

fn render_overloads<'a>(overloads: impl IntoIterator<Item = &'a Overload>) -> String {
    let parts: Vec<String> = overloads.into_iter().map(|o| o.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

impl ForeignObject for HostFunction {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn language(&self) -> &str {
        HOST_LANGUAGE
    }

    fn display_string(&self) -> String {
        format!("host function {}", self.name)
    }

    fn meta_name(&self) -> Option<String> {
        Some("HostFunction".to_string())
    }

    fn is_executable(&self) -> bool {
        true
    }

    fn execute(&self, args: &[GuestValue]) -> InteropResult<GuestValue> {
        let (overload, spread) = self.select(args)?;
        let converted = self
            .convert_arguments(overload, args, spread)
            .map_err(|e| InteropError::unsupported_type(e.message(), args.to_vec()))?;
        match (overload.body)(&self.context, &converted) {
            Ok(result) => Ok(to_guest(&self.context, &result)),
            Err(e) => Err(InteropError::Host(HostException::new(e))),
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("overloads", &self.overloads)
            .finish()
    }
}
