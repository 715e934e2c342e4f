/// Generates a proxy type implementing a trait by routing every method
/// through a [`ProxyDispatcher`](crate::ProxyDispatcher).
///
/// The trait must be object safe and `Send + Sync`. Synchronous methods return
/// `Result<T, BoxError>`; asynchronous methods return
/// `BoxFuture<'static, Result<T, BoxError>>`. Argument types must be `Clone`
/// so retries and fallbacks can replay a call. A method may list the checked
/// error types it declares with `throws [..]`.
///
/// # Syntax
///
/// ```rust,ignore
/// resilient_proxy! {
///     pub struct InventoryProxy for dyn Inventory {
///         fn stock(&self, sku: String) -> u32;
///         async fn reserve(&self, sku: String, quantity: u32) -> Reservation, throws [OutOfStock];
///     }
/// }
/// ```
///
/// This generates `InventoryProxy` with:
/// - `new(target, resolver, context)`
/// - `dispatcher()` returning the underlying dispatcher
/// - `fallback::<F>()`, a [`FallbackSource`](crate::FallbackSource) for a
///   default-constructible implementation `F` of the trait
/// - `Clone`, `PartialEq`, `Eq` and `Hash`, all following the identity of
///   the wrapped target `Arc`
/// - `Debug`, naming the interface and the target address
/// - the trait implementation itself
#[macro_export]
macro_rules! resilient_proxy {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident for dyn $iface:ident {
            $($methods:tt)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        $vis struct $name {
            dispatcher: $crate::ProxyDispatcher<dyn $iface>,
        }

        impl $name {
            /// Wraps `target`, decorating its methods with the policies `resolver` finds.
            $vis fn new(
                target: ::std::sync::Arc<dyn $iface>,
                resolver: ::std::sync::Arc<dyn $crate::PolicyResolver>,
                context: $crate::ProxyContext,
            ) -> Self {
                Self {
                    dispatcher: $crate::ProxyDispatcher::new(
                        ::std::stringify!($iface),
                        target,
                        resolver,
                        context,
                    ),
                }
            }

            /// The dispatcher routing this proxy's calls.
            $vis fn dispatcher(&self) -> &$crate::ProxyDispatcher<dyn $iface> {
                &self.dispatcher
            }

            /// A fallback source for the default-constructible implementation `F`.
            $vis fn fallback<F>() -> $crate::FallbackSource
            where
                F: $iface + ::std::default::Default + 'static,
            {
                fn upcast<F: $iface + 'static>(
                    fallback: ::std::sync::Arc<F>,
                ) -> ::std::sync::Arc<dyn $iface> {
                    fallback
                }
                $crate::FallbackSource::of::<F, dyn $iface>(upcast::<F>)
            }
        }

        impl $iface for $name {
            $crate::resilient_proxy!(@methods $iface; $($methods)*);
        }
    };

    (@methods $iface:ident;) => {};

    (@methods $iface:ident;
        fn $method:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty
            $(, throws [$($err:ty),* $(,)?])?;
        $($rest:tt)*
    ) => {
        fn $method(&self $(, $arg: $ty)*) -> ::std::result::Result<$ret, $crate::BoxError> {
            fn target(
                this: &(dyn $iface + 'static),
                ($($arg,)*): ($($ty,)*),
            ) -> ::std::result::Result<$ret, $crate::BoxError> {
                this.$method($($arg),*)
            }
            let method = $crate::Method::sync(
                ::std::stringify!($method),
                &[$(::std::stringify!($ty)),*],
                target,
            )
            $(.throws(|| ::std::vec![$($crate::ErrorType::of::<$err>()),*]))?;
            self.dispatcher.call(&method, ($($arg,)*))
        }

        $crate::resilient_proxy!(@methods $iface; $($rest)*);
    };

    (@methods $iface:ident;
        async fn $method:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty
            $(, throws [$($err:ty),* $(,)?])?;
        $($rest:tt)*
    ) => {
        fn $method(
            &self
            $(, $arg: $ty)*
        ) -> $crate::BoxFuture<'static, ::std::result::Result<$ret, $crate::BoxError>> {
            fn target(
                this: &(dyn $iface + 'static),
                ($($arg,)*): ($($ty,)*),
            ) -> $crate::BoxFuture<'static, ::std::result::Result<$ret, $crate::BoxError>> {
                this.$method($($arg),*)
            }
            let method = $crate::Method::asynchronous(
                ::std::stringify!($method),
                &[$(::std::stringify!($ty)),*],
                target,
            )
            $(.throws(|| ::std::vec![$($crate::ErrorType::of::<$err>()),*]))?;
            self.dispatcher.call_async(&method, ($($arg,)*))
        }

        $crate::resilient_proxy!(@methods $iface; $($rest)*);
    };
}
