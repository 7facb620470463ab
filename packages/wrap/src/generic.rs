//! Fallback models for opaque host objects and tree nodes.
//!
//! With no runtime reflection, host types opt into wrapping by implementing
//! [`TemplateObject`] or [`TemplateNode`]; these models put a hash (and
//! method) face on them.

use std::sync::Arc;

use formwork_model::{HashModel, MethodModel, ModelError, NodeModel, Value};

use crate::host::{TemplateNode, TemplateObject};
use crate::unwrap::deep_unwrap;
use crate::wrapper::ObjectWrapper;

/// Hash model over a [`TemplateObject`]: properties and methods by name.
///
/// Properties shadow methods of the same name. Methods come back as callable
/// values bound to the object.
pub struct GenericObjectModel {
    object: Arc<dyn TemplateObject>,
    wrapper: Arc<ObjectWrapper>,
}

impl GenericObjectModel {
    /// Expose `object` as a hash of its properties and methods.
    pub fn new(object: Arc<dyn TemplateObject>, wrapper: Arc<ObjectWrapper>) -> Self {
        GenericObjectModel { object, wrapper }
    }
}

impl HashModel for GenericObjectModel {
    fn get(&self, key: &str) -> Result<Option<Value>, ModelError> {
        if let Some(host) = self.object.get_property(key) {
            return self.wrapper.wrap(host).map(Some);
        }
        if self.object.method_names().iter().any(|n| n == key) {
            return Ok(Some(Value::Method(Arc::new(BoundMethod {
                object: self.object.clone(),
                name: key.to_string(),
                wrapper: self.wrapper.clone(),
            }))));
        }
        Ok(None)
    }

    fn contains_key(&self, key: &str) -> Result<bool, ModelError> {
        Ok(self.object.property_names().iter().any(|n| n == key)
            || self.object.method_names().iter().any(|n| n == key))
    }

    fn len(&self) -> Result<usize, ModelError> {
        Ok(self.object.property_names().len() + self.object.method_names().len())
    }

    fn keys(&self) -> Result<Vec<Value>, ModelError> {
        let mut names = self.object.property_names();
        names.extend(self.object.method_names());
        Ok(names.into_iter().map(Value::text).collect())
    }

    fn values(&self) -> Result<Vec<Value>, ModelError> {
        let mut out = Vec::new();
        for name in self.object.property_names() {
            if let Some(value) = self.get(&name)? {
                out.push(value);
            }
        }
        for name in self.object.method_names() {
            if let Some(value) = self.get(&name)? {
                out.push(value);
            }
        }
        Ok(out)
    }
}

/// A host object method bound to its receiver, callable from templates.
struct BoundMethod {
    object: Arc<dyn TemplateObject>,
    name: String,
    wrapper: Arc<ObjectWrapper>,
}

impl MethodModel for BoundMethod {
    fn exec(&self, args: &[Value]) -> Result<Value, ModelError> {
        // The host side speaks host values; relate the arguments back first.
        let mut host_args = Vec::with_capacity(args.len());
        for arg in args {
            host_args.push(deep_unwrap(arg)?);
        }
        match self.object.call_method(&self.name, &host_args) {
            Some(Ok(result)) => self.wrapper.wrap(result),
            Some(Err(err)) => Err(ModelError::MethodFailure(format!(
                "{}.{}: {}",
                self.object.type_name(),
                self.name,
                err
            ))),
            None => Err(ModelError::MethodFailure(format!(
                "{} has no method named {}",
                self.object.type_name(),
                self.name
            ))),
        }
    }
}

/// Node model over a [`TemplateNode`], with the attributes as a hash facet.
pub struct NodeAdapter {
    node: Arc<dyn TemplateNode>,
    wrapper: Arc<ObjectWrapper>,
}

impl NodeAdapter {
    /// Expose `node` as a tree-navigable value.
    pub fn new(node: Arc<dyn TemplateNode>, wrapper: Arc<ObjectWrapper>) -> Self {
        NodeAdapter { node, wrapper }
    }
}

impl NodeModel for NodeAdapter {
    fn node_name(&self) -> Result<String, ModelError> {
        Ok(self.node.name())
    }

    fn node_type(&self) -> Result<String, ModelError> {
        Ok(self.node.node_type())
    }

    fn parent(&self) -> Result<Option<Value>, ModelError> {
        match self.node.parent() {
            Some(parent) => Ok(Some(Value::Node(Arc::new(NodeAdapter::new(
                parent,
                self.wrapper.clone(),
            ))))),
            None => Ok(None),
        }
    }

    fn children(&self) -> Result<Vec<Value>, ModelError> {
        Ok(self
            .node
            .children()
            .into_iter()
            .map(|child| Value::Node(Arc::new(NodeAdapter::new(child, self.wrapper.clone()))))
            .collect())
    }

    fn as_hash(&self) -> Option<&dyn HashModel> {
        Some(self)
    }
}

impl HashModel for NodeAdapter {
    fn get(&self, key: &str) -> Result<Option<Value>, ModelError> {
        for (name, host) in self.node.attributes() {
            if name == key {
                return self.wrapper.wrap(host).map(Some);
            }
        }
        Ok(None)
    }

    fn contains_key(&self, key: &str) -> Result<bool, ModelError> {
        Ok(self.node.attributes().iter().any(|(name, _)| name == key))
    }

    fn len(&self) -> Result<usize, ModelError> {
        Ok(self.node.attributes().len())
    }

    fn keys(&self) -> Result<Vec<Value>, ModelError> {
        Ok(self
            .node
            .attributes()
            .into_iter()
            .map(|(name, _)| Value::text(name))
            .collect())
    }

    fn values(&self) -> Result<Vec<Value>, ModelError> {
        self.node
            .attributes()
            .into_iter()
            .map(|(_, host)| self.wrapper.wrap(host))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::wrapper::ObjectWrapperBuilder;

    fn wrapper() -> Arc<ObjectWrapper> {
        Arc::new(ObjectWrapperBuilder::new().build())
    }

    struct Point;

    impl TemplateObject for Point {
        fn type_name(&self) -> &'static str {
            "Point"
        }

        fn property_names(&self) -> Vec<String> {
            vec!["x".to_string(), "y".to_string()]
        }

        fn get_property(&self, name: &str) -> Option<Host> {
            match name {
                "x" => Some(Host::Int(3)),
                "y" => Some(Host::Int(4)),
                _ => None,
            }
        }

        fn method_names(&self) -> Vec<String> {
            vec!["scale".to_string()]
        }

        fn call_method(&self, name: &str, args: &[Host]) -> Option<Result<Host, ModelError>> {
            if name != "scale" {
                return None;
            }
            Some(match args {
                [Host::Int(factor)] => Ok(Host::Int(3 * factor)),
                _ => Err(ModelError::MethodFailure(
                    "scale takes one integer".to_string(),
                )),
            })
        }
    }

    struct Leaf;

    impl TemplateNode for Leaf {
        fn name(&self) -> String {
            "leaf".to_string()
        }

        fn node_type(&self) -> String {
            "element".to_string()
        }

        fn parent(&self) -> Option<Arc<dyn TemplateNode>> {
            None
        }

        fn children(&self) -> Vec<Arc<dyn TemplateNode>> {
            Vec::new()
        }

        fn attributes(&self) -> Vec<(String, Host)> {
            vec![("id".to_string(), Host::Str("n1".to_string()))]
        }
    }

    #[test]
    fn properties_read_as_hash_entries() {
        let model = GenericObjectModel::new(Arc::new(Point), wrapper());
        assert_eq!(model.get("x").unwrap(), Some(Value::from(3i64)));
        assert_eq!(model.get("nope").unwrap(), None);
        assert!(model.contains_key("y").unwrap());
        assert_eq!(HashModel::len(&model).unwrap(), 3);
    }

    #[test]
    fn methods_come_back_callable() {
        let model = GenericObjectModel::new(Arc::new(Point), wrapper());
        let method = model.get("scale").unwrap().unwrap();
        let method = method.as_method().unwrap();

        let result = method.exec(&[Value::from(5i64)]).unwrap();
        assert_eq!(result, Value::from(15i64));

        let err = method.exec(&[Value::from("no")]).unwrap_err();
        assert!(matches!(err, ModelError::MethodFailure(_)));
    }

    #[test]
    fn node_exposes_attributes_as_hash_facet() {
        let node = NodeAdapter::new(Arc::new(Leaf), wrapper());
        assert_eq!(node.node_name().unwrap(), "leaf");
        assert_eq!(node.node_type().unwrap(), "element");
        assert!(node.parent().unwrap().is_none());
        assert!(node.children().unwrap().is_empty());

        let hash = node.as_hash().unwrap();
        assert_eq!(hash.get("id").unwrap(), Some(Value::from("n1")));
        assert_eq!(hash.get("missing").unwrap(), None);
    }
}
