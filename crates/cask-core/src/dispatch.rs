use std::collections::HashMap;

use serde_json::Value;

use crate::component::Instance;
use crate::container::CallEnv;
use crate::descriptor::ComponentId;
use crate::error::{ContainerError, InvocationError};
use crate::interceptor::{ChainShape, Interceptor, InterceptorRegistry};

/// State handed to each interceptor in a chain.
///
/// `proceed` is bound to the suffix of the chain after the current link; the
/// terminal link is the target method.
pub struct InvocationContext<'a> {
    env: CallEnv<'a>,
    component: &'a ComponentId,
    target: &'a Instance,
    method: &'a str,
    args: Vec<Value>,
    chain: &'a [Box<dyn Interceptor>],
    position: usize,
    data: HashMap<String, Value>,
}

impl<'a> InvocationContext<'a> {
    pub fn component(&self) -> &ComponentId {
        self.component
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Replace the arguments seen by the rest of the chain.
    pub fn set_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    pub fn target(&self) -> &Instance {
        self.target
    }

    pub fn env(&self) -> CallEnv<'a> {
        self.env
    }

    /// Data shared by all links of this invocation.
    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.data
    }

    /// Run the remainder of the chain and return its result.
    pub fn proceed(&mut self) -> Result<Value, InvocationError> {
        let chain = self.chain;
        match chain.get(self.position) {
            Some(next) => {
                self.position += 1;
                let result = next.around_invoke(self);
                self.position -= 1;
                result
            }
            None => self.target.call(self.method, &self.args, &self.env),
        }
    }
}

/// Execute `shape` around the target method.
///
/// Interceptors are instantiated fresh for this call and notified once it
/// completes, whatever the outcome.
pub(crate) fn dispatch(
    env: CallEnv<'_>,
    target: &Instance,
    shape: &ChainShape,
    registry: &InterceptorRegistry,
    args: Vec<Value>,
) -> Result<Value, InvocationError> {
    if shape.is_empty() {
        return target.call(&shape.method, &args, &env);
    }

    let chain = shape
        .interceptors
        .iter()
        .map(|id| {
            registry
                .instantiate(id)
                .ok_or_else(|| ContainerError::UnknownInterceptor {
                    component: shape.component.clone(),
                    interceptor: id.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        component = %shape.component,
        method = %shape.method,
        links = chain.len(),
        "Dispatching through interceptor chain"
    );

    let mut ctx = InvocationContext {
        env,
        component: &shape.component,
        target,
        method: &shape.method,
        args,
        chain: &chain,
        position: 0,
        data: HashMap::new(),
    };
    let result = ctx.proceed();

    for interceptor in &chain {
        interceptor.pre_destroy();
    }
    result
}
