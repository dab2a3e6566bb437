//! FakeRuntime implementation

use parking_lot::Mutex;
use peerbridge_sdk::{
    BridgeError, BridgeResult, MethodId, NativeIdentity, NativeReference, NativeRuntime,
    NativeValue, RawRef, RefKind,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Root class every fake class derives from
pub const OBJECT_CLASS: &str = "java/lang/Object";

const CLASS_CLASS: &str = "java/lang/Class";
const CONSTRUCTOR_NAME: &str = "<init>";

/// Callback invoked with each slot right before it is deleted
pub type ReleaseHook = Arc<dyn Fn(NativeReference) + Send + Sync>;

/// Callback run with the class name before `find_class` resolves it
pub type FindClassHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-operation call counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeStats {
    /// `find_class` calls
    pub find_class: usize,
    /// `get_constructor` calls
    pub get_constructor: usize,
    /// `get_instance_method` calls
    pub get_instance_method: usize,
    /// `get_static_method` calls
    pub get_static_method: usize,
    /// `alloc_object` calls
    pub alloc_object: usize,
    /// `new_object` calls
    pub new_object: usize,
    /// `call_nonvirtual_constructor` calls
    pub call_nonvirtual_constructor: usize,
    /// `call_method` calls
    pub call_method: usize,
    /// `call_static_method` calls
    pub call_static_method: usize,
    /// `new_global_ref` calls
    pub new_global_ref: usize,
    /// `new_local_ref` calls
    pub new_local_ref: usize,
    /// `new_weak_ref` calls
    pub new_weak_ref: usize,
    /// `delete_ref` calls
    pub delete_ref: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum MemberKind {
    Constructor,
    Instance,
    Static,
}

#[derive(Debug, Clone)]
enum Behavior {
    /// Void for `V` returns, otherwise the first argument
    Echo,
    /// Identity of the target as an `Int`
    IdentityHash,
    /// Raise the named exception
    Throws(String),
}

#[derive(Debug, Clone)]
struct MethodDef {
    class: String,
    name: String,
    signature: String,
    kind: MemberKind,
    behavior: Behavior,
}

#[derive(Debug)]
struct ClassDef {
    object: u64,
    superclass: Option<String>,
    members: FxHashMap<(MemberKind, String, String), u64>,
}

#[derive(Debug)]
struct ObjectRecord {
    class: String,
    constructed: Vec<String>,
    pinned: bool,
}

#[derive(Debug)]
struct Slot {
    object: u64,
    kind: RefKind,
}

#[derive(Default)]
struct FakeState {
    classes: FxHashMap<String, ClassDef>,
    class_objects: FxHashMap<u64, String>,
    methods: FxHashMap<u64, MethodDef>,
    objects: FxHashMap<u64, ObjectRecord>,
    slots: FxHashMap<RawRef, Slot>,
    released: Vec<NativeReference>,
    stats: FakeStats,
    next_raw: u64,
    next_object: u64,
    next_method: u64,
}

impl FakeState {
    fn new_object(&mut self, class: &str, pinned: bool) -> u64 {
        self.next_object += 1;
        let id = self.next_object;
        self.objects.insert(
            id,
            ObjectRecord {
                class: class.to_string(),
                constructed: Vec::new(),
                pinned,
            },
        );
        id
    }

    fn new_slot(&mut self, object: u64, kind: RefKind) -> NativeReference {
        self.next_raw += 1;
        let raw = RawRef::from_u64(self.next_raw);
        self.slots.insert(raw, Slot { object, kind });
        NativeReference::new(raw, kind)
    }

    fn slot(&self, r: NativeReference) -> BridgeResult<&Slot> {
        if r.is_null() {
            return Err(BridgeError::native(
                "java/lang/NullPointerException",
                "null reference",
            ));
        }
        self.slots.get(&r.raw()).ok_or_else(|| {
            BridgeError::InvalidOperation(format!("Unknown or deleted reference {}", r))
        })
    }

    /// Object behind `r`, which must still be alive
    fn live_object(&self, r: NativeReference) -> BridgeResult<u64> {
        let object = self.slot(r)?.object;
        if self.objects.contains_key(&object) {
            Ok(object)
        } else {
            Err(BridgeError::native(
                "java/lang/NullPointerException",
                format!("{} refers to a collected object", r),
            ))
        }
    }

    fn class_name(&self, class: NativeReference) -> BridgeResult<String> {
        let object = self.live_object(class)?;
        self.class_objects.get(&object).cloned().ok_or_else(|| {
            BridgeError::ArgumentInvalid(format!("{} is not a class reference", class))
        })
    }

    fn define_class(&mut self, name: &str, superclass: Option<String>) {
        if self.classes.contains_key(name) {
            if let (Some(class), Some(superclass)) = (self.classes.get_mut(name), superclass) {
                class.superclass = Some(superclass);
            }
            return;
        }
        let object = self.new_object(CLASS_CLASS, true);
        self.class_objects.insert(object, name.to_string());
        self.classes.insert(
            name.to_string(),
            ClassDef {
                object,
                superclass,
                members: FxHashMap::default(),
            },
        );
    }

    fn add_member(
        &mut self,
        class: &str,
        name: &str,
        signature: &str,
        kind: MemberKind,
        behavior: Behavior,
    ) {
        let key = (kind, name.to_string(), signature.to_string());
        let existing = self
            .classes
            .get(class)
            .and_then(|def| def.members.get(&key).copied());
        let id = match existing {
            Some(id) => id,
            None => {
                self.next_method += 1;
                self.next_method
            }
        };
        self.methods.insert(
            id,
            MethodDef {
                class: class.to_string(),
                name: name.to_string(),
                signature: signature.to_string(),
                kind,
                behavior,
            },
        );
        if let Some(def) = self.classes.get_mut(class) {
            def.members.insert(key, id);
        }
    }

    /// Find a member on `class`. Instance methods are inherited.
    fn find_member(
        &self,
        class: &str,
        name: &str,
        signature: &str,
        kind: MemberKind,
    ) -> BridgeResult<MethodId> {
        let key = (kind, name.to_string(), signature.to_string());
        let mut current = Some(class.to_string());
        while let Some(class_name) = current {
            let Some(def) = self.classes.get(&class_name) else {
                break;
            };
            if let Some(id) = def.members.get(&key) {
                return Ok(MethodId::from_u64(*id));
            }
            if kind != MemberKind::Instance {
                break;
            }
            current = def.superclass.clone();
        }
        Err(BridgeError::native(
            "java/lang/NoSuchMethodError",
            format!("{}.{}{}", class, name, signature),
        ))
    }

    fn method(&self, id: MethodId, kind: MemberKind) -> BridgeResult<MethodDef> {
        match self.methods.get(&id.as_u64()) {
            Some(def) if def.kind == kind => Ok(def.clone()),
            _ => Err(BridgeError::ArgumentInvalid(format!(
                "Method id {} is not a valid {:?} member",
                id.as_u64(),
                kind
            ))),
        }
    }

    fn check_constructor(&self, class: &str, ctor: MethodId) -> BridgeResult<MethodDef> {
        let def = self.method(ctor, MemberKind::Constructor)?;
        if def.class != class {
            return Err(BridgeError::ArgumentInvalid(format!(
                "Constructor {}{} does not belong to {}",
                def.class, def.signature, class
            )));
        }
        Ok(def)
    }
}

fn invoke(def: &MethodDef, target: Option<u64>, args: &[NativeValue]) -> BridgeResult<NativeValue> {
    match &def.behavior {
        Behavior::Throws(exception) => Err(BridgeError::native(
            exception.clone(),
            format!("thrown by {}.{}{}", def.class, def.name, def.signature),
        )),
        Behavior::IdentityHash => Ok(NativeValue::Int(target.unwrap_or_default() as i32)),
        Behavior::Echo if def.signature.ends_with('V') => Ok(NativeValue::Void),
        Behavior::Echo => Ok(args.first().copied().unwrap_or(NativeValue::Void)),
    }
}

/// In-memory `NativeRuntime`
pub struct FakeRuntime {
    new_object_required: bool,
    state: Mutex<FakeState>,
    release_hook: Mutex<Option<ReleaseHook>>,
    find_class_hook: Mutex<Option<FindClassHook>>,
}

impl FakeRuntime {
    /// Runtime supporting allocate-then-construct, with `java/lang/Object`
    /// defined
    pub fn new() -> Self {
        Self::with_new_object_required(false)
    }

    /// Runtime with the given creation capability
    pub fn with_new_object_required(new_object_required: bool) -> Self {
        let runtime = Self {
            new_object_required,
            state: Mutex::new(FakeState::default()),
            release_hook: Mutex::new(None),
            find_class_hook: Mutex::new(None),
        };
        {
            let mut state = runtime.state.lock();
            state.define_class(OBJECT_CLASS, None);
            state.add_member(
                OBJECT_CLASS,
                CONSTRUCTOR_NAME,
                "()V",
                MemberKind::Constructor,
                Behavior::Echo,
            );
            state.add_member(
                OBJECT_CLASS,
                "hashCode",
                "()I",
                MemberKind::Instance,
                Behavior::IdentityHash,
            );
        }
        runtime
    }

    /// Start defining `name`, or extending it if it already exists
    pub fn define_class(&self, name: &str) -> ClassBuilder<'_> {
        ClassBuilder {
            runtime: self,
            name: name.to_string(),
            superclass: None,
            members: Vec::new(),
        }
    }

    /// Create a constructed object of `class` and return a local slot.
    ///
    /// Stands in for an object handed over by native code.
    pub fn instantiate(&self, class: &str) -> NativeReference {
        let mut state = self.state.lock();
        let object = state.new_object(class, false);
        state.new_slot(object, RefKind::Local)
    }

    /// Number of live slots of `kind`
    pub fn live_refs(&self, kind: RefKind) -> usize {
        self.state
            .lock()
            .slots
            .values()
            .filter(|slot| slot.kind == kind)
            .count()
    }

    /// Every deleted slot, in deletion order
    pub fn released(&self) -> Vec<NativeReference> {
        self.state.lock().released.clone()
    }

    /// Number of objects alive, excluding class objects
    pub fn live_objects(&self) -> usize {
        self.state
            .lock()
            .objects
            .values()
            .filter(|object| !object.pinned)
            .count()
    }

    /// Check whether the object behind `r` is still alive
    pub fn is_alive(&self, r: NativeReference) -> bool {
        self.state.lock().live_object(r).is_ok()
    }

    /// Class of the object behind `r`
    pub fn class_of(&self, r: NativeReference) -> Option<String> {
        let state = self.state.lock();
        let object = state.live_object(r).ok()?;
        state.objects.get(&object).map(|o| o.class.clone())
    }

    /// Constructor signatures run on the object behind `r`, in order
    pub fn constructed(&self, r: NativeReference) -> Vec<String> {
        let state = self.state.lock();
        state
            .live_object(r)
            .ok()
            .and_then(|object| state.objects.get(&object))
            .map(|o| o.constructed.clone())
            .unwrap_or_default()
    }

    /// Collect every object reachable only through weak slots
    pub fn collect(&self) -> usize {
        let mut state = self.state.lock();
        let reachable: Vec<u64> = state
            .slots
            .values()
            .filter(|slot| slot.kind != RefKind::Weak)
            .map(|slot| slot.object)
            .collect();
        let before = state.objects.len();
        state
            .objects
            .retain(|id, object| object.pinned || reachable.contains(id));
        let collected = before - state.objects.len();
        tracing::trace!(collected, "fake runtime collection");
        collected
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> FakeStats {
        self.state.lock().stats.clone()
    }

    /// Observe each slot right before it is deleted
    pub fn set_release_hook(&self, hook: impl Fn(NativeReference) + Send + Sync + 'static) {
        *self.release_hook.lock() = Some(Arc::new(hook));
    }

    /// Remove the release hook
    pub fn clear_release_hook(&self) {
        *self.release_hook.lock() = None;
    }

    /// Run `hook` at the start of every `find_class`, outside the runtime
    /// lock
    pub fn set_find_class_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.find_class_hook.lock() = Some(Arc::new(hook));
    }

    fn new_ref(&self, r: NativeReference, kind: RefKind) -> BridgeResult<NativeReference> {
        if r.is_null() {
            return Ok(NativeReference::null());
        }
        let mut state = self.state.lock();
        let object = state.slot(r)?.object;
        if !state.objects.contains_key(&object) {
            return Ok(NativeReference::null());
        }
        Ok(state.new_slot(object, kind))
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRuntime for FakeRuntime {
    fn new_object_required(&self) -> bool {
        self.new_object_required
    }

    fn find_class(&self, name: &str) -> BridgeResult<NativeReference> {
        let hook = self.find_class_hook.lock().clone();
        if let Some(hook) = hook {
            hook(name);
        }

        let mut state = self.state.lock();
        state.stats.find_class += 1;
        let object = state
            .classes
            .get(name)
            .map(|class| class.object)
            .ok_or_else(|| BridgeError::native("java/lang/NoClassDefFoundError", name))?;
        Ok(state.new_slot(object, RefKind::Local))
    }

    fn get_constructor(&self, class: NativeReference, signature: &str) -> BridgeResult<MethodId> {
        let mut state = self.state.lock();
        state.stats.get_constructor += 1;
        let class = state.class_name(class)?;
        state.find_member(&class, CONSTRUCTOR_NAME, signature, MemberKind::Constructor)
    }

    fn get_instance_method(
        &self,
        class: NativeReference,
        name: &str,
        signature: &str,
    ) -> BridgeResult<MethodId> {
        let mut state = self.state.lock();
        state.stats.get_instance_method += 1;
        let class = state.class_name(class)?;
        state.find_member(&class, name, signature, MemberKind::Instance)
    }

    fn get_static_method(
        &self,
        class: NativeReference,
        name: &str,
        signature: &str,
    ) -> BridgeResult<MethodId> {
        let mut state = self.state.lock();
        state.stats.get_static_method += 1;
        let class = state.class_name(class)?;
        state.find_member(&class, name, signature, MemberKind::Static)
    }

    fn alloc_object(&self, class: NativeReference) -> BridgeResult<NativeReference> {
        let mut state = self.state.lock();
        state.stats.alloc_object += 1;
        let class = state.class_name(class)?;
        let object = state.new_object(&class, false);
        Ok(state.new_slot(object, RefKind::Local))
    }

    fn new_object(
        &self,
        class: NativeReference,
        ctor: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeReference> {
        let mut state = self.state.lock();
        state.stats.new_object += 1;
        let class = state.class_name(class)?;
        let def = state.check_constructor(&class, ctor)?;
        invoke(&def, None, args)?;

        let object = state.new_object(&class, false);
        if let Some(record) = state.objects.get_mut(&object) {
            record.constructed.push(def.signature);
        }
        Ok(state.new_slot(object, RefKind::Local))
    }

    fn call_nonvirtual_constructor(
        &self,
        target: NativeReference,
        class: NativeReference,
        ctor: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<()> {
        let mut state = self.state.lock();
        state.stats.call_nonvirtual_constructor += 1;
        let object = state.live_object(target)?;
        let class = state.class_name(class)?;
        let def = state.check_constructor(&class, ctor)?;
        invoke(&def, Some(object), args)?;

        if let Some(record) = state.objects.get_mut(&object) {
            record.constructed.push(def.signature);
        }
        Ok(())
    }

    fn call_method(
        &self,
        target: NativeReference,
        method: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue> {
        let mut state = self.state.lock();
        state.stats.call_method += 1;
        let object = state.live_object(target)?;
        let def = state.method(method, MemberKind::Instance)?;
        invoke(&def, Some(object), args)
    }

    fn call_static_method(
        &self,
        class: NativeReference,
        method: MethodId,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue> {
        let mut state = self.state.lock();
        state.stats.call_static_method += 1;
        state.class_name(class)?;
        let def = state.method(method, MemberKind::Static)?;
        invoke(&def, None, args)
    }

    fn new_global_ref(&self, r: NativeReference) -> BridgeResult<NativeReference> {
        self.state.lock().stats.new_global_ref += 1;
        self.new_ref(r, RefKind::Shared)
    }

    fn new_local_ref(&self, r: NativeReference) -> BridgeResult<NativeReference> {
        self.state.lock().stats.new_local_ref += 1;
        self.new_ref(r, RefKind::Local)
    }

    fn new_weak_ref(&self, r: NativeReference) -> BridgeResult<NativeReference> {
        self.state.lock().stats.new_weak_ref += 1;
        self.new_ref(r, RefKind::Weak)
    }

    fn delete_ref(&self, r: NativeReference) -> BridgeResult<()> {
        if r.is_null() {
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            state.stats.delete_ref += 1;
            state.slot(r)?;
        }

        let hook = self.release_hook.lock().clone();
        if let Some(hook) = hook {
            hook(r);
        }

        let mut state = self.state.lock();
        let slot = state.slots.remove(&r.raw()).ok_or_else(|| {
            BridgeError::InvalidOperation(format!("Reference {} deleted twice", r))
        })?;
        if slot.kind != r.kind() {
            tracing::warn!(
                reference = %r,
                actual = slot.kind.name(),
                "deleted with mismatched kind"
            );
        }
        state.released.push(r);
        Ok(())
    }

    fn is_same_object(&self, a: NativeReference, b: NativeReference) -> BridgeResult<bool> {
        let state = self.state.lock();
        match (a.is_null(), b.is_null()) {
            (true, true) => Ok(true),
            (true, false) | (false, true) => Ok(false),
            (false, false) => Ok(state.slot(a)?.object == state.slot(b)?.object),
        }
    }

    fn identity(&self, r: NativeReference) -> BridgeResult<NativeIdentity> {
        let state = self.state.lock();
        Ok(NativeIdentity::from_u64(state.slot(r)?.object))
    }
}

/// Builder returned by `FakeRuntime::define_class`
pub struct ClassBuilder<'a> {
    runtime: &'a FakeRuntime,
    name: String,
    superclass: Option<String>,
    members: Vec<(MemberKind, String, String, Behavior)>,
}

impl ClassBuilder<'_> {
    /// Set the superclass. Defaults to `java/lang/Object`.
    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    /// Add a constructor
    pub fn constructor(self, signature: &str) -> Self {
        self.member(MemberKind::Constructor, CONSTRUCTOR_NAME, signature, Behavior::Echo)
    }

    /// Add a constructor that raises `exception`
    pub fn throwing_constructor(self, signature: &str, exception: &str) -> Self {
        let behavior = Behavior::Throws(exception.to_string());
        self.member(MemberKind::Constructor, CONSTRUCTOR_NAME, signature, behavior)
    }

    /// Add an instance method
    pub fn method(self, name: &str, signature: &str) -> Self {
        self.member(MemberKind::Instance, name, signature, Behavior::Echo)
    }

    /// Add an instance method that raises `exception`
    pub fn throwing_method(self, name: &str, signature: &str, exception: &str) -> Self {
        let behavior = Behavior::Throws(exception.to_string());
        self.member(MemberKind::Instance, name, signature, behavior)
    }

    /// Add a static method
    pub fn static_method(self, name: &str, signature: &str) -> Self {
        self.member(MemberKind::Static, name, signature, Behavior::Echo)
    }

    fn member(mut self, kind: MemberKind, name: &str, signature: &str, behavior: Behavior) -> Self {
        self.members
            .push((kind, name.to_string(), signature.to_string(), behavior));
        self
    }

    /// Install the class
    pub fn define(self) {
        let mut state = self.runtime.state.lock();
        let superclass = match self.superclass {
            Some(superclass) => Some(superclass),
            None if self.name != OBJECT_CLASS && !state.classes.contains_key(&self.name) => {
                Some(OBJECT_CLASS.to_string())
            }
            None => None,
        };
        state.define_class(&self.name, superclass);
        for (kind, name, signature, behavior) in self.members {
            state.add_member(&self.name, &name, &signature, kind, behavior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_class() {
        let fake = FakeRuntime::new();
        let err = fake.find_class("app/Missing").unwrap_err();
        let BridgeError::NativeException { class, .. } = err else {
            panic!("expected a native exception, got {err:?}");
        };
        assert_eq!(class, "java/lang/NoClassDefFoundError");
    }

    #[test]
    fn test_methods_inherited_from_object() {
        let fake = FakeRuntime::new();
        fake.define_class("app/Widget").constructor("(I)V").define();
        let class = fake.find_class("app/Widget").unwrap();

        assert!(fake.get_instance_method(class, "hashCode", "()I").is_ok());
        assert!(fake.get_constructor(class, "()V").is_err());
        assert!(fake.get_constructor(class, "(I)V").is_ok());
    }

    #[test]
    fn test_two_phase_construction_recorded() {
        let fake = FakeRuntime::new();
        let class = fake.find_class(OBJECT_CLASS).unwrap();
        let ctor = fake.get_constructor(class, "()V").unwrap();

        let object = fake.alloc_object(class).unwrap();
        assert!(fake.constructed(object).is_empty());

        fake.call_nonvirtual_constructor(object, class, ctor, &[]).unwrap();
        assert_eq!(fake.constructed(object), vec!["()V".to_string()]);
    }

    #[test]
    fn test_each_ref_is_a_new_slot() {
        let fake = FakeRuntime::new();
        let local = fake.instantiate(OBJECT_CLASS);
        let shared = fake.new_global_ref(local).unwrap();

        assert_ne!(local.raw(), shared.raw());
        assert!(fake.is_same_object(local, shared).unwrap());
        assert_eq!(fake.identity(local).unwrap(), fake.identity(shared).unwrap());
    }

    #[test]
    fn test_collect_clears_weak_targets() {
        let fake = FakeRuntime::new();
        let local = fake.instantiate(OBJECT_CLASS);
        let weak = fake.new_weak_ref(local).unwrap();

        assert_eq!(fake.collect(), 0);
        fake.delete_ref(local).unwrap();
        assert_eq!(fake.collect(), 1);

        assert!(fake.new_local_ref(weak).unwrap().is_null());
        assert_eq!(fake.live_objects(), 0);
    }

    #[test]
    fn test_double_delete_rejected() {
        let fake = FakeRuntime::new();
        let local = fake.instantiate(OBJECT_CLASS);
        fake.delete_ref(local).unwrap();
        assert!(fake.delete_ref(local).is_err());
        assert_eq!(fake.released(), vec![local]);
    }

    #[test]
    fn test_find_class_hook_sees_name() {
        let fake = FakeRuntime::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        fake.set_find_class_hook(move |name| sink.lock().push(name.to_string()));

        fake.find_class(OBJECT_CLASS).unwrap();
        assert!(fake.find_class("app/Missing").is_err());

        assert_eq!(*seen.lock(), vec![OBJECT_CLASS.to_string(), "app/Missing".to_string()]);
    }
}
