//! The class-hierarchy resolver consulted by type inference.
//!
//! Type inference needs three facts about classes it does not own: the superclass chain,
//! whether one type is assignable to another, and the least upper bound of two reference
//! types at a merge point. [`ClassHierarchy`] is the read-only service that answers them.
//! It is shared by every worker thread of a batch run, so implementations must support
//! concurrent queries and serialize only their own internal caching.
//!
//! [`ClassHierarchyMap`] is the in-memory implementation: classes are registered up front
//! and looked up through a [`DashMap`], and least-upper-bound results are memoized in a
//! second map.
//!
//! # Thread Safety
//!
//! [`ClassHierarchyMap`] is `Send + Sync`. Lookups take a shard read lock; memoizing a new
//! least upper bound takes a shard write lock for the duration of one insert.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    types::{JavaType, TypeRef},
    Error, Result,
};

/// What the hierarchy knows about one class or interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// The class itself
    pub name: TypeRef,
    /// Direct superclass; `None` only for `java.lang.Object` and interfaces without one
    pub super_class: Option<TypeRef>,
    /// Directly implemented (or, for interfaces, extended) interfaces
    pub interfaces: Vec<TypeRef>,
    /// `true` for interfaces
    pub is_interface: bool,
}

impl ClassInfo {
    /// Describes a class with the given superclass and no interfaces.
    #[must_use]
    pub fn class(name: &str, super_class: &str) -> Self {
        ClassInfo {
            name: TypeRef::new(name),
            super_class: Some(TypeRef::new(super_class)),
            interfaces: Vec::new(),
            is_interface: false,
        }
    }

    /// Describes an interface extending the given interfaces.
    #[must_use]
    pub fn interface(name: &str, extends: &[&str]) -> Self {
        ClassInfo {
            name: TypeRef::new(name),
            super_class: Some(TypeRef::object()),
            interfaces: extends.iter().map(|name| TypeRef::new(name)).collect(),
            is_interface: true,
        }
    }

    /// Adds implemented interfaces.
    #[must_use]
    pub fn implementing(mut self, interfaces: &[&str]) -> Self {
        self.interfaces
            .extend(interfaces.iter().map(|name| TypeRef::new(name)));
        self
    }
}

/// Read-only class hierarchy lookups.
///
/// Only [`ClassHierarchy::class_info`] must be implemented; the subtype and least upper
/// bound queries have default implementations on top of it.
pub trait ClassHierarchy: Send + Sync {
    /// Returns what is known about `class`, or `None` if the class is absent.
    fn class_info(&self, class: &TypeRef) -> Option<Arc<ClassInfo>>;

    /// Returns the superclass chain of `class`, starting with `class` itself and ending at
    /// `java.lang.Object`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if a class on the chain is unknown.
    fn superclass_chain(&self, class: &TypeRef) -> Result<Vec<TypeRef>> {
        let mut chain = vec![class.clone()];
        let mut current = class.clone();
        while !current.is_object() {
            let info = self
                .class_info(&current)
                .ok_or_else(|| Error::Resolution(format!("class {current} not found")))?;
            let next = info.super_class.clone().unwrap_or_else(TypeRef::object);
            if chain.contains(&next) {
                return Err(Error::Resolution(format!(
                    "cyclic superclass chain at {next}"
                )));
            }
            chain.push(next.clone());
            current = next;
        }
        Ok(chain)
    }

    /// Returns `true` if a value of type `sub` is assignable to `sup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if a class needed for the answer is unknown.
    fn is_subtype(&self, sub: &JavaType, sup: &JavaType) -> Result<bool> {
        if sub == sup || (sup.is_object() && sub.is_reference()) {
            return Ok(true);
        }
        match (sub, sup) {
            (JavaType::Array(sub_element), JavaType::Array(sup_element)) => {
                if sub_element.is_reference() && sup_element.is_reference() {
                    self.is_subtype(sub_element, sup_element)
                } else {
                    Ok(sub_element == sup_element)
                }
            }
            (JavaType::Array(_), JavaType::Class(class)) => Ok(matches!(
                class.name(),
                "java.lang.Cloneable" | "java.io.Serializable"
            )),
            (JavaType::Class(sub_class), JavaType::Class(sup_class)) => {
                let mut pending = vec![sub_class.clone()];
                let mut seen = Vec::new();
                while let Some(current) = pending.pop() {
                    if &current == sup_class {
                        return Ok(true);
                    }
                    if current.is_object() || seen.contains(&current) {
                        continue;
                    }
                    let info = self
                        .class_info(&current)
                        .ok_or_else(|| Error::Resolution(format!("class {current} not found")))?;
                    pending.extend(info.super_class.iter().cloned());
                    pending.extend(info.interfaces.iter().cloned());
                    seen.push(current);
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Returns the least upper bound of two reference types: the most specific class both
    /// are assignable to.
    ///
    /// Interfaces are only returned when one operand is a subtype of the other; otherwise
    /// the nearest common superclass is used, as the JVM verifier does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if a class on either superclass chain is unknown.
    fn least_upper_bound(&self, a: &JavaType, b: &JavaType) -> Result<JavaType> {
        if a == b {
            return Ok(a.clone());
        }
        if self.is_subtype(a, b)? {
            return Ok(b.clone());
        }
        if self.is_subtype(b, a)? {
            return Ok(a.clone());
        }
        match (a, b) {
            (JavaType::Array(a_element), JavaType::Array(b_element))
                if a_element.is_reference() && b_element.is_reference() =>
            {
                Ok(self.least_upper_bound(a_element, b_element)?.array_of())
            }
            (JavaType::Class(a_class), JavaType::Class(b_class)) => {
                let a_chain = self.superclass_chain(a_class)?;
                let b_chain = self.superclass_chain(b_class)?;
                Ok(a_chain
                    .into_iter()
                    .find(|class| b_chain.contains(class))
                    .map_or_else(JavaType::object, JavaType::Class))
            }
            _ => Ok(JavaType::object()),
        }
    }
}

/// Concurrent in-memory class hierarchy.
///
/// Created with the core `java.lang` classes registered; callers add the classes of the
/// application being decompiled with [`ClassHierarchyMap::insert`].
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::types::{ClassHierarchy, ClassHierarchyMap, ClassInfo, JavaType};
///
/// let hierarchy = ClassHierarchyMap::new();
/// hierarchy.insert(ClassInfo::class("com.example.Dog", "com.example.Animal"));
/// hierarchy.insert(ClassInfo::class("com.example.Cat", "com.example.Animal"));
/// hierarchy.insert(ClassInfo::class("com.example.Animal", "java.lang.Object"));
///
/// let lub = hierarchy.least_upper_bound(
///     &JavaType::class("com.example.Dog"),
///     &JavaType::class("com.example.Cat"),
/// )?;
/// assert_eq!(lub, JavaType::class("com.example.Animal"));
/// ```
pub struct ClassHierarchyMap {
    classes: DashMap<TypeRef, Arc<ClassInfo>>,
    lub_cache: DashMap<(JavaType, JavaType), JavaType>,
}

impl Default for ClassHierarchyMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassHierarchyMap {
    /// Creates a hierarchy containing the core `java.lang` classes.
    #[must_use]
    pub fn new() -> Self {
        let hierarchy = ClassHierarchyMap {
            classes: DashMap::new(),
            lub_cache: DashMap::new(),
        };
        hierarchy.insert(ClassInfo {
            name: TypeRef::object(),
            super_class: None,
            interfaces: Vec::new(),
            is_interface: false,
        });
        for interface in [
            "java.lang.Cloneable",
            "java.io.Serializable",
            "java.lang.Comparable",
            "java.lang.CharSequence",
            "java.lang.Runnable",
            "java.lang.Iterable",
        ] {
            hierarchy.insert(ClassInfo::interface(interface, &[]));
        }
        for (class, super_class) in [
            ("java.lang.Class", "java.lang.Object"),
            ("java.lang.Number", "java.lang.Object"),
            ("java.lang.Integer", "java.lang.Number"),
            ("java.lang.Long", "java.lang.Number"),
            ("java.lang.Float", "java.lang.Number"),
            ("java.lang.Double", "java.lang.Number"),
            ("java.lang.Boolean", "java.lang.Object"),
            ("java.lang.Character", "java.lang.Object"),
            ("java.lang.StringBuilder", "java.lang.Object"),
            ("java.lang.Throwable", "java.lang.Object"),
            ("java.lang.Exception", "java.lang.Throwable"),
            ("java.lang.Error", "java.lang.Throwable"),
            ("java.lang.RuntimeException", "java.lang.Exception"),
            ("java.lang.IllegalArgumentException", "java.lang.RuntimeException"),
            ("java.lang.IllegalStateException", "java.lang.RuntimeException"),
            ("java.lang.NullPointerException", "java.lang.RuntimeException"),
            ("java.lang.ArithmeticException", "java.lang.RuntimeException"),
            ("java.io.IOException", "java.lang.Exception"),
        ] {
            hierarchy.insert(ClassInfo::class(class, super_class));
        }
        hierarchy.insert(
            ClassInfo::class("java.lang.String", "java.lang.Object").implementing(&[
                "java.io.Serializable",
                "java.lang.Comparable",
                "java.lang.CharSequence",
            ]),
        );
        hierarchy
    }

    /// Registers (or replaces) a class. Clears memoized least upper bounds.
    pub fn insert(&self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), Arc::new(info));
        self.lub_cache.clear();
    }

    /// Returns the number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no classes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassHierarchy for ClassHierarchyMap {
    fn class_info(&self, class: &TypeRef) -> Option<Arc<ClassInfo>> {
        self.classes.get(class).map(|entry| Arc::clone(entry.value()))
    }

    fn least_upper_bound(&self, a: &JavaType, b: &JavaType) -> Result<JavaType> {
        // Symmetric; normalize the key so (a, b) and (b, a) share one entry.
        let key = if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        if let Some(cached) = self.lub_cache.get(&key) {
            return Ok(cached.value().clone());
        }
        let lub = default_least_upper_bound(self, a, b)?;
        self.lub_cache.insert(key, lub.clone());
        Ok(lub)
    }
}

// The trait default, callable from an override that adds caching.
fn default_least_upper_bound<H: ClassHierarchy + ?Sized>(
    hierarchy: &H,
    a: &JavaType,
    b: &JavaType,
) -> Result<JavaType> {
    struct Uncached<'h, H: ?Sized>(&'h H);

    impl<H: ClassHierarchy + ?Sized> ClassHierarchy for Uncached<'_, H> {
        fn class_info(&self, class: &TypeRef) -> Option<Arc<ClassInfo>> {
            self.0.class_info(class)
        }
    }

    Uncached(hierarchy).least_upper_bound(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animals() -> ClassHierarchyMap {
        let hierarchy = ClassHierarchyMap::new();
        hierarchy.insert(ClassInfo::interface("com.example.Pet", &[]));
        hierarchy.insert(ClassInfo::class("com.example.Animal", "java.lang.Object"));
        hierarchy.insert(
            ClassInfo::class("com.example.Dog", "com.example.Animal")
                .implementing(&["com.example.Pet"]),
        );
        hierarchy.insert(ClassInfo::class("com.example.Cat", "com.example.Animal"));
        hierarchy
    }

    #[test]
    fn test_subtype_queries() {
        let hierarchy = animals();
        let dog = JavaType::class("com.example.Dog");
        let animal = JavaType::class("com.example.Animal");

        assert!(hierarchy.is_subtype(&dog, &animal).unwrap());
        assert!(hierarchy
            .is_subtype(&dog, &JavaType::class("com.example.Pet"))
            .unwrap());
        assert!(!hierarchy.is_subtype(&animal, &dog).unwrap());
        assert!(hierarchy.is_subtype(&dog, &JavaType::object()).unwrap());
        assert!(hierarchy
            .is_subtype(&dog.clone().array_of(), &animal.clone().array_of())
            .unwrap());
    }

    #[test]
    fn test_least_upper_bound() {
        let hierarchy = animals();
        let lub = hierarchy
            .least_upper_bound(
                &JavaType::class("com.example.Dog"),
                &JavaType::class("com.example.Cat"),
            )
            .unwrap();
        assert_eq!(lub, JavaType::class("com.example.Animal"));

        let exceptions = hierarchy
            .least_upper_bound(
                &JavaType::class("java.lang.IllegalStateException"),
                &JavaType::class("java.io.IOException"),
            )
            .unwrap();
        assert_eq!(exceptions, JavaType::class("java.lang.Exception"));

        let arrays = hierarchy
            .least_upper_bound(&JavaType::INT.array_of(), &JavaType::LONG.array_of())
            .unwrap();
        assert_eq!(arrays, JavaType::object());
    }

    #[test]
    fn test_unknown_class_is_resolution_error() {
        let hierarchy = animals();
        let result = hierarchy.least_upper_bound(
            &JavaType::class("com.example.Missing"),
            &JavaType::class("com.example.Cat"),
        );
        assert!(matches!(result, Err(Error::Resolution(_))));
    }

    #[test]
    fn test_concurrent_lookups() {
        let hierarchy = Arc::new(animals());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let hierarchy = Arc::clone(&hierarchy);
                std::thread::spawn(move || {
                    hierarchy
                        .least_upper_bound(
                            &JavaType::class("com.example.Cat"),
                            &JavaType::class("com.example.Dog"),
                        )
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), JavaType::class("com.example.Animal"));
        }
    }
}
