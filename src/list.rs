use std::{marker::PhantomData, ptr::NonNull};

/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// A list node. Nodes are never owned by the [`List`] holding them: they
/// live inside the heap region, and a node can move from one list to another
/// without being copied.
pub(crate) struct Node<T> {
    /// Pointer to the next node of the list
    pub next: Link<Self>,
    /// Pointer to the previous node of the list
    pub prev: Link<Self>,
    /// Element of the node
    pub data: T,
}

/// Intrusive, unordered, doubly-linked list.
///
/// New nodes always go to the head, so iteration yields the most recently
/// inserted node first.
///
/// ```text
///  head                                          tail
///   |                                             |
/// +-v------+ next  +--------+ next  +--------+    |
/// |  Node  | ----> |  Node  | ----> |  Node  | <--+
/// |        | <---- |        | <---- |        |
/// +--------+  prev +--------+  prev +--------+
/// ```
pub(crate) struct List<T> {
    head: Link<Node<T>>,
    tail: Link<Node<T>>,
    len: usize,
    marker: PhantomData<T>,
}

/// Iterator over the nodes of a [`List`], head first.
pub(crate) struct Iter<'a, T> {
    current: Link<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a Node<T>>,
}

impl<T> List<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn first(&self) -> Link<Node<T>> {
        self.head
    }

    #[inline]
    pub fn last(&self) -> Link<Node<T>> {
        self.tail
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes a brand new node holding `data` at `addr` and links it at the
    /// head of the list.
    ///
    /// Because we are the memory allocator, this list can never allocate
    /// itself. The caller hands us the exact place where the node must live.
    ///
    /// **SAFETY**: `addr` must be valid for writes of a `Node<T>`, suitably
    /// aligned, and not part of any other live node.
    pub unsafe fn insert(&mut self, data: T, addr: NonNull<u8>) -> NonNull<Node<T>> {
        let node = addr.cast::<Node<T>>();

        unsafe {
            node.as_ptr().write(Node {
                next: None,
                prev: None,
                data,
            });
            self.push_front(node);
        }

        node
    }

    /// Links an existing, currently unlinked `node` at the head of the list.
    ///
    /// **SAFETY**: `node` must point to a valid node that is not a member of
    /// any list.
    pub unsafe fn push_front(&mut self, mut node: NonNull<Node<T>>) {
        unsafe {
            node.as_mut().prev = None;
            node.as_mut().next = self.head;

            match self.head {
                Some(mut head) => head.as_mut().prev = Some(node),
                None => self.tail = Some(node),
            }
        }

        self.head = Some(node);
        self.len += 1;
    }

    /// Unlinks `node` by patching its neighbours. The node itself is left
    /// detached with both links cleared.
    ///
    /// **SAFETY**: `node` must be a member of this list.
    pub unsafe fn remove(&mut self, mut node: NonNull<Node<T>>) {
        unsafe {
            let prev = node.as_ref().prev;
            let next = node.as_ref().next;

            match prev {
                Some(mut prev) => prev.as_mut().next = next,
                None => self.head = next,
            }

            match next {
                Some(mut next) => next.as_mut().prev = prev,
                None => self.tail = prev,
            }

            node.as_mut().prev = None;
            node.as_mut().next = None;
        }

        self.len -= 1;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = NonNull<Node<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        // `remaining` bounds the walk so a corrupted cycle can't spin forever.
        if self.remaining == 0 {
            return None;
        }

        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
        }
        self.remaining -= 1;

        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = NonNull<Node<T>>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
