// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin definitions for node inputs/outputs.

use crate::evaluation::Eval;
use crate::link::{Link, LinkId};
use crate::node::NodeId;
use crate::render::PinRenderHook;
use egui::{Pos2, Rect, Vec2};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

/// Identifier of a pin, unique within its node and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinUid(pub u64);

impl PinUid {
    /// Derive a pin ID by hashing any hashable key
    pub fn of<K: Hash + ?Sized>(key: &K) -> Self {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl From<&str> for PinUid {
    fn from(key: &str) -> Self {
        Self::of(key)
    }
}

impl From<String> for PinUid {
    fn from(key: String) -> Self {
        Self::of(key.as_str())
    }
}

macro_rules! pin_uid_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for PinUid {
            fn from(key: $ty) -> Self {
                Self::of(&key)
            }
        })*
    };
}

pin_uid_from_int!(u8, u16, u32, u64, usize, i32, i64);

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinKind {
    /// Input pin, owns at most one link
    Input,
    /// Output pin, fans out to any number of links
    Output,
}

/// Type tag of the values a pin carries
#[derive(Clone, Copy)]
pub struct DataType {
    id: TypeId,
    name: &'static str,
}

impl DataType {
    /// Tag for type `T`
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Check whether this tag belongs to type `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Readable type name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DataType {}

impl Hash for DataType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({})", self.name)
    }
}

/// Values that can flow through pins
pub trait PinData: Any + Clone + Default {}

impl<T: Any + Clone + Default> PinData for T {}

/// Untyped reference to a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinRef {
    /// Owning node
    pub node: NodeId,
    /// Pin ID within the node
    pub uid: PinUid,
    /// Direction
    pub kind: PinKind,
}

impl PinRef {
    /// Reference to an input pin
    pub fn input(node: NodeId, uid: impl Into<PinUid>) -> Self {
        Self {
            node,
            uid: uid.into(),
            kind: PinKind::Input,
        }
    }

    /// Reference to an output pin
    pub fn output(node: NodeId, uid: impl Into<PinUid>) -> Self {
        Self {
            node,
            uid: uid.into(),
            kind: PinKind::Output,
        }
    }
}

macro_rules! typed_handle {
    ($name:ident, $kind:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $name<T> {
            node: NodeId,
            uid: PinUid,
            _marker: PhantomData<fn() -> T>,
        }

        impl<T> $name<T> {
            pub(crate) fn new(node: NodeId, uid: PinUid) -> Self {
                Self {
                    node,
                    uid,
                    _marker: PhantomData,
                }
            }

            /// Owning node
            pub fn node(&self) -> NodeId {
                self.node
            }

            /// Pin ID
            pub fn uid(&self) -> PinUid {
                self.uid
            }

            /// Untyped reference to the same pin
            pub fn pin_ref(&self) -> PinRef {
                PinRef {
                    node: self.node,
                    uid: self.uid,
                    kind: $kind,
                }
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> PartialEq for $name<T> {
            fn eq(&self, other: &Self) -> bool {
                self.node == other.node && self.uid == other.uid
            }
        }

        impl<T> Eq for $name<T> {}

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("node", &self.node)
                    .field("uid", &self.uid)
                    .finish()
            }
        }

        impl<T> From<$name<T>> for PinRef {
            fn from(handle: $name<T>) -> Self {
                handle.pin_ref()
            }
        }
    };
}

typed_handle!(InPin, PinKind::Input, "Typed handle to an input pin carrying `T`");
typed_handle!(OutPin, PinKind::Output, "Typed handle to an output pin producing `T`");

/// Description of a pin handed to connection filters
#[derive(Debug, Clone, Copy)]
pub struct PinInfo<'a> {
    /// Pin reference
    pub pin: PinRef,
    /// Display name
    pub name: &'a str,
    /// Data type
    pub data_type: DataType,
}

/// Predicate deciding whether an `(output, input)` pair may be linked
#[derive(Clone)]
pub struct ConnectionFilter(Rc<dyn Fn(&PinInfo<'_>, &PinInfo<'_>) -> bool>);

impl ConnectionFilter {
    /// Accept every candidate
    pub fn none() -> Self {
        Self::custom(|_, _| true)
    }

    /// Accept only identical data types
    pub fn same_type() -> Self {
        Self::custom(|output, input| output.data_type == input.data_type)
    }

    /// Accept outputs carrying a primitive number
    pub fn numbers() -> Self {
        Self::custom(|output, _| {
            let ty = output.data_type;
            ty.is::<f32>()
                || ty.is::<f64>()
                || ty.is::<i32>()
                || ty.is::<i64>()
                || ty.is::<u32>()
                || ty.is::<u64>()
        })
    }

    /// Filter from a custom predicate
    pub fn custom(filter: impl Fn(&PinInfo<'_>, &PinInfo<'_>) -> bool + 'static) -> Self {
        Self(Rc::new(filter))
    }

    /// Evaluate the filter
    pub fn accepts(&self, output: &PinInfo<'_>, input: &PinInfo<'_>) -> bool {
        (self.0)(output, input)
    }
}

impl Default for ConnectionFilter {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for ConnectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionFilter(..)")
    }
}

/// Socket geometry and color tag of a pin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinStyle {
    /// Socket and link color
    pub color: [u8; 3],
    /// Socket radius (grid space)
    pub socket_radius: f32,
    /// Gap between the pin label and its socket
    pub socket_padding: f32,
}

impl PinStyle {
    /// Default style with a different color
    pub fn with_color(color: [u8; 3]) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

impl Default for PinStyle {
    fn default() -> Self {
        Self {
            color: [87, 155, 185],
            socket_radius: 4.0,
            socket_padding: 6.0,
        }
    }
}

/// Producer function of an output pin, type-erased
pub(crate) type Behaviour = Box<dyn Fn(&Eval<'_>) -> Box<dyn Any>>;

fn default_boxed<T: PinData>() -> Box<dyn Any> {
    Box::new(T::default())
}

/// State shared by both pin kinds
pub(crate) struct PinCore {
    uid: PinUid,
    name: String,
    pub(crate) node: NodeId,
    data_type: DataType,
    pub(crate) style: PinStyle,
    /// Label rectangle from the last layout pass (grid space)
    pub(crate) rect: Rect,
    pub(crate) render_hook: Option<PinRenderHook>,
}

impl PinCore {
    fn new(uid: PinUid, name: String, node: NodeId, data_type: DataType, style: PinStyle) -> Self {
        Self {
            uid,
            name,
            node,
            data_type,
            style,
            rect: Rect::NOTHING,
            render_hook: None,
        }
    }
}

/// An input pin, owner of at most one link
pub struct InputPin {
    core: PinCore,
    link: Option<Link>,
    default: Box<dyn Any>,
    filter: ConnectionFilter,
    allow_same_node: bool,
}

impl InputPin {
    pub(crate) fn new<T: PinData>(
        node: NodeId,
        uid: PinUid,
        name: String,
        default: T,
        filter: ConnectionFilter,
        style: PinStyle,
    ) -> Self {
        Self {
            core: PinCore::new(uid, name, node, DataType::of::<T>(), style),
            link: None,
            default: Box::new(default),
            filter,
            allow_same_node: false,
        }
    }

    /// Pin ID
    pub fn uid(&self) -> PinUid {
        self.core.uid
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Data type tag
    pub fn data_type(&self) -> DataType {
        self.core.data_type
    }

    /// Untyped reference to this pin
    pub fn pin_ref(&self) -> PinRef {
        PinRef {
            node: self.core.node,
            uid: self.core.uid,
            kind: PinKind::Input,
        }
    }

    /// Whether a link is attached
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// The attached link
    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    /// Value returned while unconnected
    pub fn default_value<T: PinData>(&self) -> Option<T> {
        self.default.downcast_ref::<T>().cloned()
    }

    /// Connection filter checked when a link is created
    pub fn filter(&self) -> &ConnectionFilter {
        &self.filter
    }

    /// Whether links from outputs of the same node are accepted
    pub fn allows_same_node(&self) -> bool {
        self.allow_same_node
    }

    /// Socket center (grid space), left of the label
    pub fn socket(&self) -> Pos2 {
        let rect = self.core.rect;
        Pos2::new(rect.left() - self.core.style.socket_padding, rect.center().y)
    }

    pub(crate) fn info(&self) -> PinInfo<'_> {
        PinInfo {
            pin: self.pin_ref(),
            name: &self.core.name,
            data_type: self.core.data_type,
        }
    }

    pub(crate) fn core_mut(&mut self) -> &mut PinCore {
        &mut self.core
    }

    pub(crate) fn set_allow_same_node(&mut self, allow: bool) {
        self.allow_same_node = allow;
    }

    /// Attach a link, returning the one it replaces
    pub(crate) fn set_link(&mut self, link: Link) -> Option<Link> {
        self.link.replace(link)
    }

    pub(crate) fn take_link(&mut self) -> Option<Link> {
        self.link.take()
    }

    pub(crate) fn link_mut(&mut self) -> Option<&mut Link> {
        self.link.as_mut()
    }
}

impl fmt::Debug for InputPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPin")
            .field("uid", &self.core.uid)
            .field("name", &self.core.name)
            .field("data_type", &self.core.data_type)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

/// An output pin, producing values on demand
pub struct OutputPin {
    core: PinCore,
    links: Vec<LinkId>,
    behaviour: Option<Behaviour>,
    fallback: fn() -> Box<dyn Any>,
    last: RefCell<Option<Box<dyn Any>>>,
}

impl OutputPin {
    pub(crate) fn new<T: PinData>(node: NodeId, uid: PinUid, name: String, style: PinStyle) -> Self {
        Self {
            core: PinCore::new(uid, name, node, DataType::of::<T>(), style),
            links: Vec::new(),
            behaviour: None,
            fallback: default_boxed::<T>,
            last: RefCell::new(None),
        }
    }

    /// Pin ID
    pub fn uid(&self) -> PinUid {
        self.core.uid
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Data type tag
    pub fn data_type(&self) -> DataType {
        self.core.data_type
    }

    /// Untyped reference to this pin
    pub fn pin_ref(&self) -> PinRef {
        PinRef {
            node: self.core.node,
            uid: self.core.uid,
            kind: PinKind::Output,
        }
    }

    /// Whether any link fans out from this pin
    pub fn is_connected(&self) -> bool {
        !self.links.is_empty()
    }

    /// Links fanning out from this pin
    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Whether a producer is attached
    pub fn has_behaviour(&self) -> bool {
        self.behaviour.is_some()
    }

    /// Most recently computed value
    pub fn last_value<T: PinData>(&self) -> Option<T> {
        self.last
            .borrow()
            .as_ref()
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Socket center (grid space), right of the label
    pub fn socket(&self) -> Pos2 {
        let rect = self.core.rect;
        Pos2::new(rect.right() + self.core.style.socket_padding, rect.center().y)
    }

    pub(crate) fn info(&self) -> PinInfo<'_> {
        PinInfo {
            pin: self.pin_ref(),
            name: &self.core.name,
            data_type: self.core.data_type,
        }
    }

    pub(crate) fn core_mut(&mut self) -> &mut PinCore {
        &mut self.core
    }

    pub(crate) fn set_behaviour(&mut self, behaviour: Behaviour) {
        self.behaviour = Some(behaviour);
    }

    /// Run the producer, or build the type default when none is attached
    pub(crate) fn produce(&self, eval: &Eval<'_>) -> Box<dyn Any> {
        match &self.behaviour {
            Some(behaviour) => behaviour(eval),
            None => (self.fallback)(),
        }
    }

    pub(crate) fn store_last(&self, value: Box<dyn Any>) {
        *self.last.borrow_mut() = Some(value);
    }

    pub(crate) fn attach(&mut self, link: LinkId) {
        self.links.push(link);
    }

    pub(crate) fn detach(&mut self, link: LinkId) {
        self.links.retain(|id| *id != link);
    }
}

impl fmt::Debug for OutputPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPin")
            .field("uid", &self.core.uid)
            .field("name", &self.core.name)
            .field("data_type", &self.core.data_type)
            .field("links", &self.links)
            .finish_non_exhaustive()
    }
}

/// Borrowed view of either pin kind
#[derive(Debug, Clone, Copy)]
pub enum AnyPin<'a> {
    /// Input pin
    Input(&'a InputPin),
    /// Output pin
    Output(&'a OutputPin),
}

impl<'a> AnyPin<'a> {
    fn core(&self) -> &'a PinCore {
        match self {
            Self::Input(pin) => &pin.core,
            Self::Output(pin) => &pin.core,
        }
    }

    /// Pin ID
    pub fn uid(&self) -> PinUid {
        self.core().uid
    }

    /// Display name
    pub fn name(&self) -> &'a str {
        &self.core().name
    }

    /// Direction
    pub fn kind(&self) -> PinKind {
        match self {
            Self::Input(_) => PinKind::Input,
            Self::Output(_) => PinKind::Output,
        }
    }

    /// Data type tag
    pub fn data_type(&self) -> DataType {
        self.core().data_type
    }

    /// Owning node
    pub fn node(&self) -> NodeId {
        self.core().node
    }

    /// Untyped reference to this pin
    pub fn pin_ref(&self) -> PinRef {
        match self {
            Self::Input(pin) => pin.pin_ref(),
            Self::Output(pin) => pin.pin_ref(),
        }
    }

    /// Label rectangle from the last layout pass (grid space)
    pub fn rect(&self) -> Rect {
        self.core().rect
    }

    /// Socket style
    pub fn style(&self) -> &'a PinStyle {
        &self.core().style
    }

    /// Socket center (grid space)
    pub fn socket(&self) -> Pos2 {
        match self {
            Self::Input(pin) => pin.socket(),
            Self::Output(pin) => pin.socket(),
        }
    }

    /// Whether the pin takes part in any link
    pub fn is_connected(&self) -> bool {
        match self {
            Self::Input(pin) => pin.is_connected(),
            Self::Output(pin) => pin.is_connected(),
        }
    }

    /// Custom render hook, if any
    pub fn render_hook(&self) -> Option<&'a PinRenderHook> {
        self.core().render_hook.as_ref()
    }

    /// Hit box: label rectangle grown to cover the socket
    pub fn hit_rect(&self, socket_radius: f32) -> Rect {
        let rect = self.rect();
        if rect == Rect::NOTHING {
            return rect;
        }
        let radius = socket_radius.max(self.style().socket_radius);
        rect.union(Rect::from_center_size(self.socket(), Vec2::splat(radius * 2.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_uid_is_stable_per_key() {
        assert_eq!(PinUid::from("value"), PinUid::from("value"));
        assert_eq!(PinUid::from("value"), PinUid::from(String::from("value")));
        assert_ne!(PinUid::from("a"), PinUid::from("b"));
        assert_eq!(PinUid::from(3u32), PinUid::from(3u32));
    }

    #[test]
    fn test_data_type_equality() {
        assert_eq!(DataType::of::<f32>(), DataType::of::<f32>());
        assert_ne!(DataType::of::<f32>(), DataType::of::<i32>());
        assert!(DataType::of::<String>().is::<String>());
        assert!(DataType::of::<f64>().name().contains("f64"));
    }

    #[test]
    fn test_builtin_filters() {
        let node = NodeId::new();
        let float_pin = PinInfo {
            pin: PinRef::output(node, "f"),
            name: "f",
            data_type: DataType::of::<f32>(),
        };
        let text_pin = PinInfo {
            pin: PinRef::input(node, "t"),
            name: "t",
            data_type: DataType::of::<String>(),
        };

        assert!(ConnectionFilter::none().accepts(&float_pin, &text_pin));
        assert!(!ConnectionFilter::same_type().accepts(&float_pin, &text_pin));
        assert!(ConnectionFilter::same_type().accepts(&float_pin, &float_pin));
        assert!(ConnectionFilter::numbers().accepts(&float_pin, &text_pin));
        assert!(!ConnectionFilter::numbers().accepts(&text_pin, &float_pin));
    }

    #[test]
    fn test_typed_handles_convert_to_pin_ref() {
        let node = NodeId::new();
        let input: InPin<f32> = InPin::new(node, PinUid::from("x"));
        let output: OutPin<f32> = OutPin::new(node, PinUid::from("x"));
        assert_eq!(PinRef::from(input), PinRef::input(node, "x"));
        assert_eq!(PinRef::from(output), PinRef::output(node, "x"));
        assert_ne!(input.pin_ref(), output.pin_ref());
    }

    #[test]
    fn test_input_default_value_downcasts() {
        let pin = InputPin::new(
            NodeId::new(),
            PinUid::from("x"),
            "X".into(),
            7i32,
            ConnectionFilter::none(),
            PinStyle::default(),
        );
        assert_eq!(pin.default_value::<i32>(), Some(7));
        assert_eq!(pin.default_value::<f32>(), None);
        assert!(!pin.is_connected());
    }

    #[test]
    fn test_sockets_sit_outside_label() {
        let mut input = InputPin::new(
            NodeId::new(),
            PinUid::from("x"),
            "X".into(),
            0.0f32,
            ConnectionFilter::none(),
            PinStyle::default(),
        );
        let rect = Rect::from_min_size(Pos2::new(10.0, 10.0), Vec2::new(30.0, 20.0));
        input.core_mut().rect = rect;
        assert_eq!(input.socket(), Pos2::new(4.0, 20.0));

        let mut output = OutputPin::new::<f32>(NodeId::new(), PinUid::from("y"), "Y".into(), PinStyle::default());
        output.core_mut().rect = rect;
        assert_eq!(output.socket(), Pos2::new(46.0, 20.0));

        let hit = AnyPin::Output(&output).hit_rect(5.0);
        assert!(hit.contains(output.socket()));
        assert!(hit.contains(rect.center()));
    }

    #[test]
    fn test_unlaid_pin_has_empty_hit_box() {
        let output = OutputPin::new::<f32>(NodeId::new(), PinUid::from("y"), "Y".into(), PinStyle::default());
        assert!(!AnyPin::Output(&output).hit_rect(5.0).contains(Pos2::ZERO));
    }
}
