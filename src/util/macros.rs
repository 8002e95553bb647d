/// Generates one or more `unsafe fn addr_of_<field>(self: NonNull<Self>) -> NonNull<FieldTy>`
/// associated functions that compute a field's address without ever forming an
/// intermediate `&mut Self` reference, which would violate the aliasing rules of
/// a node embedded in an intrusive list.
macro_rules! generate_addr_of_methods {
    (
        impl<$($gen:ident)?> $struct_name:ident {
            $(
                $(#[$attrs:meta])*
                unsafe fn $fn_name:ident(self: NonNull<Self>) -> NonNull<$field_type:ty> {
                    &self$(.$field_name:tt)+
                }
            )*
        }
    ) => {
        impl<$($gen)?> $struct_name<$($gen)?> {
            $(
                $(#[$attrs])*
                unsafe fn $fn_name(me: ::std::ptr::NonNull<Self>) -> ::std::ptr::NonNull<$field_type> {
                    let me = me.as_ptr();
                    let field = ::std::ptr::addr_of_mut!((*me)$(.$field_name)+);
                    ::std::ptr::NonNull::new_unchecked(field)
                }
            )*
        }
    }
}

pub(crate) use generate_addr_of_methods;
